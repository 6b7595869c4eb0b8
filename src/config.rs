//! Configuration loading via `ortho-config`.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::deploy::DeployDefaults;
use crate::metal::Session;
use crate::util::{expand_tilde, read_to_string_ambient};

/// Bare-metal service configuration derived from environment variables,
/// configuration files, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "IRONSMITH")]
pub struct MetalConfig {
    /// Base URL of the bare-metal provisioning service. This value is
    /// required.
    pub api_endpoint: String,
    /// Token presented on every provisioning service call. This value is
    /// required.
    pub auth_token: String,
    /// Resource class requested for nodes when an instance names none.
    #[ortho_config(default = "baremetal".to_owned())]
    pub default_resource_class: String,
    /// Deploy image used when an instance names none.
    #[ortho_config(default = "baremetal-full".to_owned())]
    pub default_image: String,
    /// Network attached when an instance declares no interfaces.
    #[ortho_config(default = "provisioning".to_owned())]
    pub default_network: String,
    /// Root partition size in gibibytes used when an instance names none.
    #[ortho_config(default = 49)]
    pub default_root_size_gb: u32,
    /// Login name of the administrative account created on each instance.
    #[ortho_config(default = "metal-admin".to_owned())]
    pub default_ssh_user: String,
    /// Path to a file of SSH public keys installed on deployed instances,
    /// one per line.
    pub ssh_key_file: Option<String>,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
    section: &'static str,
}

impl FieldMetadata {
    const fn new(
        description: &'static str,
        env_var: &'static str,
        toml_key: &'static str,
        section: &'static str,
    ) -> Self {
        Self {
            description,
            env_var,
            toml_key,
            section,
        }
    }
}

impl MetalConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to [{}] in ironsmith.toml",
                metadata.description, metadata.env_var, metadata.toml_key, metadata.section
            )));
        }
        Ok(())
    }

    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags in
    /// that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("ironsmith")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Builds an authenticated session for the provisioning service.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when the endpoint or token is
    /// empty.
    pub fn session(&self) -> Result<Session, ConfigError> {
        self.validate()?;
        Ok(Session::new(&self.api_endpoint, &self.auth_token))
    }

    /// Builds deployment defaults from the configured values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn as_defaults(&self) -> Result<DeployDefaults, ConfigError> {
        self.validate()?;
        Ok(DeployDefaults {
            resource_class: self.default_resource_class.clone(),
            image: self.default_image.clone(),
            network: self.default_network.clone(),
            root_size_gb: self.default_root_size_gb,
            ssh_user: self.default_ssh_user.clone(),
        })
    }

    /// Reads the configured SSH key file, returning one key per non-empty
    /// line. Returns an empty list when no file is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::KeyFile`] when the file cannot be read.
    pub fn ssh_keys(&self) -> Result<Vec<String>, ConfigError> {
        let Some(path) = self.ssh_key_file.as_deref() else {
            return Ok(Vec::new());
        };
        read_ssh_key_file(path)
    }

    /// Performs semantic validation on required fields. Error messages include
    /// guidance on how to provide missing values via environment variables or
    /// configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.api_endpoint,
            &FieldMetadata::new(
                "provisioning service endpoint",
                "IRONSMITH_API_ENDPOINT",
                "api_endpoint",
                "metal",
            ),
        )?;
        Self::require_field(
            &self.auth_token,
            &FieldMetadata::new(
                "provisioning service auth token",
                "IRONSMITH_AUTH_TOKEN",
                "auth_token",
                "metal",
            ),
        )?;
        Self::require_field(
            &self.default_resource_class,
            &FieldMetadata::new(
                "node resource class",
                "IRONSMITH_DEFAULT_RESOURCE_CLASS",
                "default_resource_class",
                "metal",
            ),
        )?;
        Self::require_field(
            &self.default_image,
            &FieldMetadata::new(
                "deploy image",
                "IRONSMITH_DEFAULT_IMAGE",
                "default_image",
                "metal",
            ),
        )?;
        Self::require_field(
            &self.default_network,
            &FieldMetadata::new(
                "provisioning network",
                "IRONSMITH_DEFAULT_NETWORK",
                "default_network",
                "metal",
            ),
        )?;
        Self::require_field(
            &self.default_ssh_user,
            &FieldMetadata::new(
                "administrative SSH user",
                "IRONSMITH_DEFAULT_SSH_USER",
                "default_ssh_user",
                "metal",
            ),
        )?;
        Ok(())
    }
}

/// Reads an SSH public key file, returning one key per non-empty line.
///
/// # Errors
///
/// Returns [`ConfigError::KeyFile`] when the file cannot be read.
pub fn read_ssh_key_file(path: &str) -> Result<Vec<String>, ConfigError> {
    let expanded = expand_tilde(path);
    let content = read_to_string_ambient(&expanded).map_err(|message| ConfigError::KeyFile {
        path: expanded.clone(),
        message,
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect())
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
    /// Raised when the configured SSH key file cannot be read.
    #[error("failed to read ssh key file `{path}`: {message}")]
    KeyFile {
        /// Expanded path that failed to read.
        path: String,
        /// Underlying error message.
        message: String,
    },
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::EnvGuard;
    use rstest::rstest;

    fn base_config() -> MetalConfig {
        MetalConfig {
            api_endpoint: String::from("https://metal.example.test"),
            auth_token: String::from("secret"),
            default_resource_class: String::from("baremetal"),
            default_image: String::from("baremetal-full"),
            default_network: String::from("provisioning"),
            default_root_size_gb: 49,
            default_ssh_user: String::from("metal-admin"),
            ssh_key_file: None,
        }
    }

    #[rstest]
    fn validate_accepts_complete_config() {
        base_config().validate().expect("config should validate");
    }

    #[rstest]
    fn validate_names_the_env_var_for_missing_fields() {
        let mut config = base_config();
        config.auth_token = String::from("  ");
        let err = config.validate().expect_err("blank token should fail");
        let message = err.to_string();
        assert!(message.contains("IRONSMITH_AUTH_TOKEN"), "{message}");
        assert!(message.contains("auth_token"), "{message}");
    }

    #[rstest]
    fn session_requires_an_endpoint() {
        let mut config = base_config();
        config.api_endpoint = String::new();
        let err = config.session().expect_err("empty endpoint should fail");
        assert!(err.to_string().contains("IRONSMITH_API_ENDPOINT"));
    }

    #[rstest]
    fn as_defaults_copies_configured_values() {
        let mut config = base_config();
        config.default_network = String::from("ctlplane");
        config.default_root_size_gb = 100;
        let defaults = config.as_defaults().expect("defaults should build");
        assert_eq!(defaults.network, "ctlplane");
        assert_eq!(defaults.root_size_gb, 100);
        assert_eq!(defaults.ssh_user, "metal-admin");
    }

    #[rstest]
    fn ssh_keys_without_configured_file_is_empty() {
        let keys = base_config().ssh_keys().expect("no file means no keys");
        assert!(keys.is_empty());
    }

    #[rstest]
    fn read_ssh_key_file_skips_blank_lines() {
        use cap_std::{ambient_authority, fs_utf8::Dir};

        let dir = tempfile::TempDir::new().expect("temp dir");
        let root = camino::Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .expect("utf8 temp dir");
        Dir::open_ambient_dir(&root, ambient_authority())
            .expect("open temp dir")
            .write(
                "keys",
                "ssh-ed25519 AAAA first\n\n  ssh-ed25519 BBBB second  \n",
            )
            .expect("write keys");

        let keys = read_ssh_key_file(root.join("keys").as_str()).expect("keys should load");
        assert_eq!(
            keys,
            vec![
                String::from("ssh-ed25519 AAAA first"),
                String::from("ssh-ed25519 BBBB second"),
            ]
        );
    }

    #[rstest]
    fn read_ssh_key_file_reports_missing_file() {
        let err = read_ssh_key_file("/nonexistent/keys").expect_err("missing file");
        assert!(matches!(err, ConfigError::KeyFile { .. }), "got {err:?}");
    }

    #[rstest]
    fn load_without_cli_args_reads_the_environment() {
        let _guard = EnvGuard::set_vars(&[
            ("IRONSMITH_API_ENDPOINT", "https://metal.example.test"),
            ("IRONSMITH_AUTH_TOKEN", "secret"),
        ]);
        let config = MetalConfig::load_without_cli_args().expect("config should load");
        assert_eq!(config.api_endpoint, "https://metal.example.test");
        assert_eq!(config.default_image, "baremetal-full");
    }
}
