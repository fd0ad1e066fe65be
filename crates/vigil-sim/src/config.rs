//! Simulation configuration.
//!
//! A scenario is one TOML file: the world tunables, the arena, the scripted
//! target, the agents to spawn and any scripted hits or stuns. Missing or
//! broken files fall back to the built-in arena.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use vigil_ai::boss::{BossConfig, RetreatConfig};
use vigil_ai::guard::GuardConfig;
use vigil_ai::world::WorldConfig;
use vigil_common::{ensure_positive, ensure_ticks, ConfigResult, Tick, VigilResult};

/// Default scenario file name.
const CONFIG_FILE: &str = "vigil-sim.toml";

/// Axis-aligned box that blocks sight and navigation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Obstacle {
    /// Whether `point` lies inside the box.
    #[must_use]
    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }
}

/// Sphere in which the target counts as concealed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverZone {
    /// Zone center
    pub center: Vec3,
    /// Zone radius
    pub radius: f32,
}

/// Looping waypoint walk for the target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetScript {
    /// Starting position
    pub start: Vec3,
    /// Waypoints, visited in order and looped
    pub waypoints: Vec<Vec3>,
    /// Distance covered per tick
    pub speed: f32,
    /// Areas where the target is hidden
    pub cover: Vec<CoverZone>,
}

impl Default for TargetScript {
    fn default() -> Self {
        Self {
            start: Vec3::new(30.0, 0.0, 0.0),
            waypoints: vec![
                Vec3::new(30.0, 0.0, 0.0),
                Vec3::new(4.0, 0.0, 2.0),
                Vec3::new(-12.0, 0.0, -14.0),
                Vec3::new(14.0, 0.0, 14.0),
            ],
            speed: 0.15,
            cover: vec![CoverZone {
                center: Vec3::new(-12.0, 0.0, -14.0),
                radius: 3.0,
            }],
        }
    }
}

/// A guard to spawn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardSpawn {
    /// Post position
    pub post: Vec3,
    /// Guard tunables
    #[serde(default)]
    pub config: GuardConfig,
}

/// A boss to spawn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BossSpawn {
    /// Spawn position
    pub spawn: Vec3,
    /// RON file overriding `config`
    #[serde(default)]
    pub config_ron: Option<PathBuf>,
    /// Inline tunables
    #[serde(default)]
    pub config: BossConfig,
}

impl BossSpawn {
    /// Resolves the boss config, reading the RON file if one is named.
    pub fn resolve(&self) -> VigilResult<BossConfig> {
        match &self.config_ron {
            Some(path) => {
                let text = fs::read_to_string(path)?;
                Ok(BossConfig::from_ron(&text)?)
            },
            None => Ok(self.config.clone()),
        }
    }
}

/// Damage dealt to an agent on a given tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScriptedHit {
    /// Tick the hit lands on
    pub tick: Tick,
    /// Raw agent id; agents are numbered from 1 in spawn order, guards first
    pub agent: u64,
    /// Damage
    pub amount: f32,
}

/// Stun applied to a boss on a given tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedStun {
    /// Tick the stun lands on
    pub tick: Tick,
    /// Raw agent id
    pub agent: u64,
    /// Stun length
    pub ticks: Tick,
}

/// Full scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Ticks to run
    pub ticks: Tick,
    /// Progress log interval; zero disables it
    pub report_every: Tick,
    /// Distance an agent walks per tick at speed scale 1
    pub agent_speed: f32,
    /// Scheduler, tracker and bus tunables
    pub world: WorldConfig,
    /// Blocking boxes
    pub obstacles: Vec<Obstacle>,
    /// Target walk
    pub target: TargetScript,
    /// Guards
    pub guards: Vec<GuardSpawn>,
    /// Bosses
    pub bosses: Vec<BossSpawn>,
    /// Scripted damage
    pub hits: Vec<ScriptedHit>,
    /// Scripted stuns
    pub stuns: Vec<ScriptedStun>,
}

impl Default for SimConfig {
    fn default() -> Self {
        let boss = BossConfig {
            intro_ticks: 30,
            phase_transition_ticks: 45,
            retreat: RetreatConfig {
                health_threshold: 0.35,
                ..RetreatConfig::default()
            },
            patrol_route: vec![Vec3::new(16.0, 0.0, 10.0), Vec3::new(16.0, 0.0, -10.0)],
            ..BossConfig::default()
        };
        Self {
            ticks: 1200,
            report_every: 200,
            agent_speed: 0.2,
            world: WorldConfig::default(),
            obstacles: vec![Obstacle {
                min: Vec3::new(-4.0, 0.0, -8.0),
                max: Vec3::new(-2.0, 3.0, -4.0),
            }],
            target: TargetScript::default(),
            guards: vec![
                GuardSpawn {
                    post: Vec3::new(0.0, 0.0, -10.0),
                    config: GuardConfig::default(),
                },
                GuardSpawn {
                    post: Vec3::new(8.0, 0.0, 6.0),
                    config: GuardConfig::default(),
                },
            ],
            bosses: vec![BossSpawn {
                spawn: Vec3::new(16.0, 0.0, 0.0),
                config_ron: None,
                config: boss,
            }],
            hits: vec![
                ScriptedHit {
                    tick: 300,
                    agent: 3,
                    amount: 450.0,
                },
                ScriptedHit {
                    tick: 500,
                    agent: 3,
                    amount: 350.0,
                },
                ScriptedHit {
                    tick: 900,
                    agent: 3,
                    amount: 250.0,
                },
            ],
            stuns: vec![ScriptedStun {
                tick: 650,
                agent: 3,
                ticks: 30,
            }],
        }
    }
}

impl SimConfig {
    /// Load the scenario from the default file location.
    pub fn load() -> Self {
        Self::load_from(Self::config_path())
    }

    /// Load the scenario from a specific path.
    /// Returns the built-in arena if the file is missing or invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Scenario file not found, using the built-in arena");
            return Self::default();
        }

        let mut contents = String::new();
        if let Err(e) = fs::File::open(path).and_then(|mut f| f.read_to_string(&mut contents)) {
            warn!("Failed to read scenario file: {e}");
            return Self::default();
        }

        match toml::from_str::<Self>(&contents) {
            Ok(config) => match config.validate() {
                Ok(()) => {
                    info!("Loaded scenario from {}", path.display());
                    config
                },
                Err(e) => {
                    warn!("Invalid scenario file: {e}");
                    Self::default()
                },
            },
            Err(e) => {
                warn!("Failed to parse scenario file: {e}");
                Self::default()
            },
        }
    }

    /// Save the scenario to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut file = fs::File::create(path)?;
        file.write_all(contents.as_bytes())?;

        info!("Saved scenario to {}", path.display());
        Ok(())
    }

    /// Checks the runner's own fields. Agent configs are checked at spawn.
    pub fn validate(&self) -> ConfigResult<()> {
        ensure_ticks("ticks", self.ticks)?;
        ensure_positive("agent_speed", self.agent_speed)?;
        ensure_positive("target.speed", self.target.speed)?;
        self.world.validate()
    }

    fn config_path() -> PathBuf {
        PathBuf::from(CONFIG_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vigil_common::{ConfigError, VigilError};

    #[test]
    fn test_default_scenario_is_valid() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.guards.len(), 2);
        assert!(config.bosses[0].resolve().is_ok());
    }

    #[test]
    fn test_save_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("arena.toml");

        let mut config = SimConfig::default();
        config.ticks = 77;
        config.target.speed = 0.4;
        config.save_to(&path).expect("Failed to save scenario");

        let loaded = SimConfig::load_from(&path);
        assert_eq!(loaded.ticks, 77);
        assert!((loaded.target.speed - 0.4).abs() < 1e-6);
        assert_eq!(loaded.bosses.len(), 1);
        assert_eq!(
            loaded.bosses[0].config.phases.len(),
            config.bosses[0].config.phases.len()
        );
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = SimConfig::load_from("/nonexistent/path/arena.toml");
        assert_eq!(config.ticks, SimConfig::default().ticks);
    }

    #[test]
    fn test_invalid_file_uses_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("broken.toml");
        fs::write(&path, "ticks = 0\n").expect("write");
        assert_eq!(SimConfig::load_from(&path).ticks, SimConfig::default().ticks);

        fs::write(&path, "ticks = [").expect("write");
        assert_eq!(SimConfig::load_from(&path).ticks, SimConfig::default().ticks);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("partial.toml");
        let partial = r#"
ticks = 50

[[guards]]
post = [1.0, 0.0, 2.0]

[guards.config]
detection_radius = 6.0
"#;
        fs::write(&path, partial).expect("write");
        let config = SimConfig::load_from(&path);
        assert_eq!(config.ticks, 50);
        assert_eq!(config.guards.len(), 1);
        assert_eq!(config.guards[0].config.detection_radius, 6.0);
        assert_eq!(config.guards[0].config.melee_radius, GuardConfig::default().melee_radius);
        assert!(!config.bosses.is_empty());
    }

    #[test]
    fn test_boss_ron_override() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("boss.ron");
        fs::write(&path, "(max_health: 250.0, intro_ticks: 0)").expect("write");
        let spawn = BossSpawn {
            spawn: Vec3::ZERO,
            config_ron: Some(path),
            config: BossConfig::default(),
        };
        let resolved = spawn.resolve().expect("ron config");
        assert_eq!(resolved.max_health, 250.0);
        assert_eq!(resolved.intro_ticks, 0);

        let missing = BossSpawn {
            config_ron: Some(temp_dir.path().join("missing.ron")),
            ..spawn
        };
        assert!(matches!(missing.resolve(), Err(VigilError::Io(_))));

        let path = temp_dir.path().join("boss.ron");
        fs::write(&path, "(phases: [])").expect("write");
        let empty = BossSpawn {
            config_ron: Some(path),
            ..missing
        };
        assert!(matches!(
            empty.resolve(),
            Err(VigilError::Config(ConfigError::EmptyPhaseTable))
        ));
    }
}
