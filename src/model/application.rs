use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Suffix of the StatefulSet that backs an application
pub const STATEFULSET_SUFFIX: &str = "statefulset";

/// Longest object name the cluster accepts for these kinds
const MAX_OBJECT_NAME_LEN: usize = 63;

/// Longest usable app_name (the longest suffix is "-statefulset")
pub const MAX_APP_NAME_LEN: usize = MAX_OBJECT_NAME_LEN - STATEFULSET_SUFFIX.len() - 1;

/// Mount path used when storage is requested without a path
pub const DEFAULT_STORAGE_MOUNT_PATH: &str = "/var/lib/postgresql/data";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid app_name {0:?}: must be 1-{max} lowercase alphanumerics or '-', starting and ending alphanumeric", max = MAX_APP_NAME_LEN)]
    InvalidAppName(String),

    #[error("replicas must be at least 1, got {0}")]
    InvalidReplicas(i32),

    #[error("service_port must be between 1 and 65535, got {0}")]
    InvalidPort(i32),

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{field} is not a valid resource quantity: {value:?}")]
    InvalidQuantity { field: &'static str, value: String },
}

/// Desired state of a tenant database workload
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ApplicationConfig {
    pub app_name: String,
    pub replicas: i32,
    pub user: String,
    pub password: String,
    pub db_name: String,
    pub image_address: String,
    pub image_tag: String,
    pub domain_address: String,
    pub service_port: i32,
    pub external_access: bool,
    pub monitor: bool,
    pub cpu_request: String,
    pub cpu_limit: String,
    pub memory_request: String,
    pub memory_limit: String,

    /// Size of the per-replica data volume (e.g. "10Gi"); no volume when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_size: Option<String>,

    /// Where the data volume is mounted inside the container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_mount_path: Option<String>,
}

/// Resource-only update for an existing workload
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ResourceUpdateConfig {
    pub app_name: String,
    pub cpu_request: String,
    pub cpu_limit: String,
    pub memory_request: String,
    pub memory_limit: String,
}

/// CPU and memory requests/limits, in quantity syntax
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceQuantities {
    pub cpu_request: String,
    pub cpu_limit: String,
    pub memory_request: String,
    pub memory_limit: String,
}

impl ResourceQuantities {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_quantity("cpu_request", &self.cpu_request)?;
        validate_quantity("cpu_limit", &self.cpu_limit)?;
        validate_quantity("memory_request", &self.memory_request)?;
        validate_quantity("memory_limit", &self.memory_limit)
    }
}

impl ApplicationConfig {
    pub fn resources(&self) -> ResourceQuantities {
        ResourceQuantities {
            cpu_request: self.cpu_request.clone(),
            cpu_limit: self.cpu_limit.clone(),
            memory_request: self.memory_request.clone(),
            memory_limit: self.memory_limit.clone(),
        }
    }

    pub fn names(&self) -> ObjectNames {
        ObjectNames::new(&self.app_name)
    }

    /// Full image reference ("address:tag")
    pub fn image(&self) -> String {
        format!("{}:{}", self.image_address, self.image_tag)
    }

    pub fn storage_mount_path(&self) -> &str {
        self.storage_mount_path
            .as_deref()
            .unwrap_or(DEFAULT_STORAGE_MOUNT_PATH)
    }

    /// Reject descriptors the cluster would refuse or misinterpret
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_app_name(&self.app_name)?;

        if self.replicas < 1 {
            return Err(ValidationError::InvalidReplicas(self.replicas));
        }
        if !(1..=65535).contains(&self.service_port) {
            return Err(ValidationError::InvalidPort(self.service_port));
        }

        for (field, value) in [
            ("user", &self.user),
            ("password", &self.password),
            ("db_name", &self.db_name),
            ("image_address", &self.image_address),
            ("image_tag", &self.image_tag),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::Empty(field));
            }
        }
        if self.external_access && self.domain_address.trim().is_empty() {
            return Err(ValidationError::Empty("domain_address"));
        }

        if let Some(size) = &self.storage_size {
            validate_quantity("storage_size", size)?;
        }
        if let Some(path) = &self.storage_mount_path {
            if path.trim().is_empty() {
                return Err(ValidationError::Empty("storage_mount_path"));
            }
        }

        self.resources().validate()
    }
}

impl ResourceUpdateConfig {
    pub fn resources(&self) -> ResourceQuantities {
        ResourceQuantities {
            cpu_request: self.cpu_request.clone(),
            cpu_limit: self.cpu_limit.clone(),
            memory_request: self.memory_request.clone(),
            memory_limit: self.memory_limit.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_app_name(&self.app_name)?;
        self.resources().validate()
    }
}

/// Deterministic names of every object in an application's resource graph
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectNames {
    pub app: String,
    pub secret: String,
    pub config_map: String,
    pub statefulset: String,
    pub service: String,
    pub ingress: String,
    pub container: String,
}

impl ObjectNames {
    pub fn new(app_name: &str) -> Self {
        Self {
            app: app_name.to_string(),
            secret: format!("{}-secret", app_name),
            config_map: format!("{}-config", app_name),
            statefulset: statefulset_name(app_name),
            service: format!("{}-service", app_name),
            ingress: format!("{}-ingress", app_name),
            container: format!("{}-container", app_name),
        }
    }
}

pub fn statefulset_name(app_name: &str) -> String {
    format!("{}-{}", app_name, STATEFULSET_SUFFIX)
}

/// Recover an app_name from a generated StatefulSet name
///
/// Drops the last hyphen-separated segment. Lossy: this is only used for
/// objects that predate the app-name label.
pub fn app_name_from_object_name(object_name: &str) -> String {
    let mut segments: Vec<&str> = object_name.split('-').collect();
    segments.pop();
    segments.join("-")
}

fn validate_app_name(name: &str) -> Result<(), ValidationError> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let valid_edges = name.starts_with(|c: char| c.is_ascii_alphanumeric())
        && name.ends_with(|c: char| c.is_ascii_alphanumeric());

    if name.is_empty() || name.len() > MAX_APP_NAME_LEN || !valid_chars || !valid_edges {
        return Err(ValidationError::InvalidAppName(name.to_string()));
    }
    Ok(())
}

/// Check a value against the cluster's resource quantity grammar
///
/// Accepts a decimal number followed by an optional binary suffix (Ki..Ei),
/// decimal suffix (m, k, M..E) or decimal exponent (e3, E-2).
pub fn is_valid_quantity(value: &str) -> bool {
    let unsigned = value.strip_prefix(['+', '-']).unwrap_or(value);
    let number_end = unsigned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(unsigned.len());
    let (number, suffix) = unsigned.split_at(number_end);

    let digits = number.replacen('.', "", 1);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    match suffix {
        "" | "m" | "k" | "M" | "G" | "T" | "P" | "E" => true,
        "Ki" | "Mi" | "Gi" | "Ti" | "Pi" | "Ei" => true,
        exp if exp.starts_with(['e', 'E']) => {
            let exponent = &exp[1..];
            let exponent = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
            !exponent.is_empty() && exponent.chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}

fn validate_quantity(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if is_valid_quantity(value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidQuantity {
            field,
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
#[path = "application_test.rs"]
mod tests;
