use configparser::ini::Ini;

use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::result::Result;
use std::string::String;
use std::time::Duration;


pub const DEFAULT_INTERVAL_MINUTES: u64 = 5;

pub const DEFAULT_MAX_TILES_PER_RUN: usize = 100;

pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Clone, Debug)]
pub struct PyramidConfig {
    pub rebuild: RebuildConfig,
    pub storage: StorageConfig,
    pub import: ImportConfig,
}

impl PyramidConfig {
    pub fn new() -> PyramidConfig {
        PyramidConfig {
            rebuild: RebuildConfig::new(),
            storage: StorageConfig::new(),
            import: ImportConfig::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RebuildConfig {
    pub enabled: bool,
    pub interval: Duration,
    pub max_tiles_per_run: usize,
}

impl RebuildConfig {
    pub fn new() -> RebuildConfig {
        RebuildConfig {
            enabled: true,
            interval: Duration::from_secs(DEFAULT_INTERVAL_MINUTES * 60),
            max_tiles_per_run: DEFAULT_MAX_TILES_PER_RUN,
        }
    }
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub grid_storage: PathBuf,
    pub database: PathBuf,
}

impl StorageConfig {
    pub fn new() -> StorageConfig {
        StorageConfig {
            grid_storage: PathBuf::from("map"),
            database: PathBuf::from("map/pyramid.db"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ImportConfig {
    pub batch_size: usize,
}

impl ImportConfig {
    pub fn new() -> ImportConfig {
        ImportConfig {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

pub fn load(
    path: &Path,
) -> Result<PyramidConfig, ParseError> {
    let mut ini = Ini::new();
    ini.load(path)?;
    return parse(&ini);
}

fn parse(
    ini: &Ini,
) -> Result<PyramidConfig, ParseError> {
    let mut config = PyramidConfig::new();
    for section_name in &(ini.sections()) {
        match section_name.to_lowercase().as_str() {
            "zoom_rebuild" => {
                config.rebuild = parse_rebuild(ini, section_name)?;
            },
            "storage" => {
                config.storage = parse_storage(ini, section_name)?;
            },
            "import" => {
                config.import = parse_import(ini, section_name)?;
            },
            _ => (),
        };
    }
    return Ok(config);
}

fn parse_rebuild(ini: &Ini, section_name: &String) -> Result<RebuildConfig, ParseError> {
    let mut config = RebuildConfig::new();
    if let Some(enabled) = ini.getbool(section_name.as_str(), "enabled")? {
        config.enabled = enabled;
    }
    if let Some(minutes) = ini.getuint(section_name.as_str(), "interval_minutes")? {
        let seconds = minutes.checked_mul(60).ok_or_else(|| {
            ParseError::from(format!("interval_minutes {} is too large", minutes))
        })?;
        config.interval = Duration::from_secs(seconds);
    }
    if let Some(max_tiles) = ini.getuint(section_name.as_str(), "max_tiles_per_run")? {
        config.max_tiles_per_run = max_tiles as usize;
    }
    return Ok(config);
}

fn parse_storage(ini: &Ini, section_name: &String) -> Result<StorageConfig, ParseError> {
    let mut config = StorageConfig::new();
    if let Some(grid_storage) = ini.get(section_name.as_str(), "grid_storage") {
        config.grid_storage = PathBuf::from(grid_storage);
    }
    if let Some(database) = ini.get(section_name.as_str(), "database") {
        config.database = PathBuf::from(database);
    }
    return Ok(config);
}

fn parse_import(ini: &Ini, section_name: &String) -> Result<ImportConfig, ParseError> {
    let mut config = ImportConfig::new();
    if let Some(batch_size) = ini.getuint(section_name.as_str(), "batch_size")? {
        if batch_size == 0 {
            return Err(ParseError::from(String::from("batch_size must be at least 1")));
        }
        config.batch_size = batch_size as usize;
    }
    return Ok(config);
}

#[derive(Debug)]
pub struct ParseError {
    reason: String,
}

impl From<String> for ParseError {
    fn from(reason: String) -> Self {
        return ParseError { reason };
    }
}

impl Error for ParseError {}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PyramidConfig parsing failed: {}", self.reason)
    }
}
