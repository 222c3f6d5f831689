//! gd-project: scenario file format, validation and system construction.

pub mod builder;
pub mod schema;
pub mod validate;

pub use builder::{Built, build_system};
pub use schema::*;
pub use validate::{LATEST_VERSION, ValidationError, validate_scenario};

use gd_components::ComponentError;
use gd_core::CoreError;
use gd_system::SystemError;

pub type ProjectResult<T> = Result<T, ProjectError>;

#[derive(thiserror::Error, Debug)]
pub enum ProjectError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("System error: {0}")]
    System(#[from] SystemError),

    #[error("Component error: {0}")]
    Component(#[from] ComponentError),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Parse and validate a scenario from YAML text.
pub fn from_str(content: &str) -> ProjectResult<Scenario> {
    let scenario: Scenario = serde_yaml::from_str(content)?;
    validate_scenario(&scenario)?;
    Ok(scenario)
}

pub fn load_yaml(path: &std::path::Path) -> ProjectResult<Scenario> {
    let content = std::fs::read_to_string(path)?;
    from_str(&content)
}

pub fn save_yaml(path: &std::path::Path, scenario: &Scenario) -> ProjectResult<()> {
    validate_scenario(scenario)?;
    let content = serde_yaml::to_string(scenario)?;
    std::fs::write(path, content)?;
    Ok(())
}
