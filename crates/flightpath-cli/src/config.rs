//! Configuration Vault – reads/writes `~/.flightpath/config.toml`, plus the
//! drone registry (`drones.toml`) it points at.

use std::fs;
use std::path::{Path, PathBuf};

use flightpath_mavlink::ConnectionDescriptor;
use flightpath_types::GatewayError;
use serde::{Deserialize, Serialize};

/// Persisted user configuration stored in `~/.flightpath/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Path of the drone registry file.
    #[serde(default = "default_drone_registry")]
    pub drone_registry: String,

    /// Serial device used when a registry entry names none.
    #[serde(default = "default_mavlink_port")]
    pub default_port: String,

    #[serde(default = "default_baud_rate")]
    pub default_baud_rate: u32,

    /// How long `/connect` waits for the first heartbeat.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// `/watch` refresh rate.
    #[serde(default = "default_telemetry_rate_hz")]
    pub telemetry_rate_hz: u32,
}

fn default_drone_registry() -> String {
    "./data/config/drones.toml".to_string()
}
fn default_mavlink_port() -> String {
    "/dev/ttyUSB0".to_string()
}
fn default_baud_rate() -> u32 {
    57600
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_telemetry_rate_hz() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            drone_registry: default_drone_registry(),
            default_port: default_mavlink_port(),
            default_baud_rate: default_baud_rate(),
            connect_timeout_ms: default_connect_timeout_ms(),
            telemetry_rate_hz: default_telemetry_rate_hz(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), String> {
        if self.default_baud_rate == 0 {
            return Err("default_baud_rate must be greater than zero".to_string());
        }
        if self.connect_timeout_ms == 0 {
            return Err("connect_timeout_ms must be greater than zero".to_string());
        }
        if self.telemetry_rate_hz == 0 {
            return Err("telemetry_rate_hz must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Return the path to `~/.flightpath/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".flightpath").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok(Some(cfg))
}

/// Apply `FLIGHTPATH_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `FLIGHTPATH_DRONE_REGISTRY` | `drone_registry` |
/// | `FLIGHTPATH_MAVLINK_PORT` | `default_port` |
/// | `FLIGHTPATH_MAVLINK_BAUD` | `default_baud_rate` |
/// | `FLIGHTPATH_CONNECT_TIMEOUT_MS` | `connect_timeout_ms` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("FLIGHTPATH_DRONE_REGISTRY") {
        cfg.drone_registry = v;
    }
    if let Ok(v) = std::env::var("FLIGHTPATH_MAVLINK_PORT") {
        cfg.default_port = v;
    }
    if let Ok(v) = std::env::var("FLIGHTPATH_MAVLINK_BAUD")
        && let Ok(baud) = v.parse::<u32>()
    {
        cfg.default_baud_rate = baud;
    }
    if let Ok(v) = std::env::var("FLIGHTPATH_CONNECT_TIMEOUT_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.connect_timeout_ms = ms;
    }
}

/// Save the config to disk, creating `~/.flightpath/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    cfg.validate()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Drone registry
// ─────────────────────────────────────────────────────────────────────────────

/// Per-drone connection overrides.  Everything is optional; serial settings
/// fall back to the vault defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DroneConnection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baud_rate: Option<u32>,
    /// Local UDP address to listen on (e.g. `0.0.0.0:14540` for PX4 SITL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub udp: Option<String>,
    /// Remote TCP address to connect to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroneConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// `mavlink`, `dji`, ...
    pub protocol: String,
    #[serde(default)]
    pub connection: DroneConnection,
}

impl DroneConfig {
    /// Resolve the transport endpoint for this drone.
    ///
    /// # Errors
    ///
    /// [`GatewayError::UnsupportedProtocol`] for anything but MAVLink.
    pub fn descriptor(&self, defaults: &Config) -> Result<ConnectionDescriptor, GatewayError> {
        match self.protocol.to_ascii_lowercase().as_str() {
            "mavlink" => {}
            "dji" => {
                return Err(GatewayError::UnsupportedProtocol(
                    "dji (not yet implemented)".to_string(),
                ));
            }
            other => return Err(GatewayError::UnsupportedProtocol(other.to_string())),
        }

        let conn = &self.connection;
        if let Some(address) = &conn.udp {
            return Ok(ConnectionDescriptor::UdpListen {
                address: address.clone(),
            });
        }
        if let Some(address) = &conn.tcp {
            return Ok(ConnectionDescriptor::TcpConnect {
                address: address.clone(),
            });
        }
        Ok(ConnectionDescriptor::Serial {
            device: conn
                .port
                .clone()
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| defaults.default_port.clone()),
            baud_rate: conn
                .baud_rate
                .filter(|b| *b > 0)
                .unwrap_or(defaults.default_baud_rate),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DroneRegistry {
    #[serde(default)]
    pub drones: Vec<DroneConfig>,
}

impl DroneRegistry {
    pub fn load(path: &Path) -> Result<Self, String> {
        let raw = fs::read_to_string(path).map_err(|e| {
            format!("Failed to read drone registry at {}: {}", path.display(), e)
        })?;
        toml::from_str(&raw).map_err(|e| format!("Failed to parse drone registry: {}", e))
    }

    pub fn ids(&self) -> Vec<&str> {
        self.drones.iter().map(|d| d.id.as_str()).collect()
    }

    pub fn find(&self, id: &str) -> Result<&DroneConfig, String> {
        self.drones.iter().find(|d| d.id == id).ok_or_else(|| {
            format!(
                "Drone not found in registry: {}. Available drones: {:?}",
                id,
                self.ids()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTRY: &str = r#"
        [[drones]]
        id = "px4-sitl"
        name = "PX4 SITL"
        description = "Gazebo x500"
        protocol = "mavlink"
        connection = { udp = "0.0.0.0:14540" }

        [[drones]]
        id = "field-1"
        name = "Field quad"
        protocol = "mavlink"
        connection = { port = "/dev/ttyACM0" }

        [[drones]]
        id = "mavic"
        name = "Mavic"
        protocol = "dji"
    "#;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.default_port, "/dev/ttyUSB0");
        assert_eq!(loaded.default_baud_rate, 57600);
        assert_eq!(loaded.connect_timeout_ms, 5000);
        assert_eq!(loaded.telemetry_rate_hz, 1);
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);

        let dir_mode = fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn config_path_points_to_flightpath_dir() {
        let p = config_path_for_home("/home/pilot");
        assert!(p.to_string_lossy().contains(".flightpath"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: Config = toml::from_str(r#"default_port = "/dev/ttyS1""#).unwrap();
        assert_eq!(cfg.default_port, "/dev/ttyS1");
        assert_eq!(cfg.default_baud_rate, 57600);
    }

    #[test]
    fn validate_rejects_zero_values() {
        let mut cfg = Config::default();
        cfg.default_baud_rate = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.connect_timeout_ms = 0;
        assert!(cfg.validate().is_err());

        assert!(Config::default().validate().is_ok());
    }

    // All env-var assertions live in one test so parallel tests never race
    // on the same variables.
    #[test]
    fn apply_env_overrides_reads_flightpath_vars() {
        // SAFETY: only this test touches FLIGHTPATH_* variables.
        unsafe {
            std::env::set_var("FLIGHTPATH_MAVLINK_PORT", "/dev/ttyACM1");
            std::env::set_var("FLIGHTPATH_MAVLINK_BAUD", "921600");
            std::env::set_var("FLIGHTPATH_CONNECT_TIMEOUT_MS", "not-a-number");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.default_port, "/dev/ttyACM1");
        assert_eq!(cfg.default_baud_rate, 921600);
        assert_eq!(cfg.connect_timeout_ms, 5000, "unparsable value is ignored");
        unsafe {
            std::env::remove_var("FLIGHTPATH_MAVLINK_PORT");
            std::env::remove_var("FLIGHTPATH_MAVLINK_BAUD");
            std::env::remove_var("FLIGHTPATH_CONNECT_TIMEOUT_MS");
        }
    }

    #[test]
    fn registry_lookup_and_descriptors() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("drones.toml");
        fs::write(&path, REGISTRY).unwrap();

        let registry = DroneRegistry::load(&path).expect("registry");
        assert_eq!(registry.ids(), vec!["px4-sitl", "field-1", "mavic"]);

        let defaults = Config::default();

        let sitl = registry.find("px4-sitl").unwrap();
        assert_eq!(
            sitl.descriptor(&defaults).unwrap(),
            ConnectionDescriptor::UdpListen {
                address: "0.0.0.0:14540".into()
            }
        );

        let field = registry.find("field-1").unwrap();
        assert_eq!(
            field.descriptor(&defaults).unwrap(),
            ConnectionDescriptor::Serial {
                device: "/dev/ttyACM0".into(),
                baud_rate: 57600,
            }
        );

        let mavic = registry.find("mavic").unwrap();
        assert!(matches!(
            mavic.descriptor(&defaults),
            Err(GatewayError::UnsupportedProtocol(_))
        ));
    }

    #[test]
    fn unknown_drone_lists_available_ids() {
        let registry: DroneRegistry = toml::from_str(REGISTRY).unwrap();
        let err = registry.find("nope").unwrap_err();
        assert!(err.contains("px4-sitl"));
    }
}
