//! Container image manifest parsing and template resolution.
//!
//! Manifests list container images under a `container_images` key. A
//! templated variant keeps the same entries under `container_images_template`
//! with placeholder substitution applied against a fixed set of variables, so
//! one manifest can target multiple registries and release tags.

use serde::{Deserialize, Serialize};
use tera::{Context, Tera};

use crate::images::ImageError;
use crate::util::{expand_tilde, read_to_string_ambient};

/// One image entry in a manifest.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ImageEntry {
    /// Full image reference, for example
    /// `docker.io/tripleoupstream/centos-binary-nova-compute:latest`.
    pub imagename: String,
    /// Uploader backend used to push the image, when one applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    /// Registry the image should be pushed to, when one applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_destination: Option<String>,
}

/// Substitution variables available to templated manifests.
///
/// Each field maps to a placeholder of the same name. The defaults track the
/// upstream community registry layout; override individual fields with struct
/// update syntax.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TemplateVars {
    /// Registry and namespace prefix. Defaults to `docker.io/tripleoupstream`.
    pub namespace: String,
    /// Registry and namespace for Ceph images. Defaults to `docker.io/ceph`.
    pub ceph_namespace: String,
    /// Ceph image name. Defaults to `daemon`.
    pub ceph_image: String,
    /// Ceph image tag. Defaults to `tag-stable-3.0-luminous-centos-7`.
    pub ceph_tag: String,
    /// Image name prefix. A trailing hyphen is appended when missing.
    /// Defaults to `centos-binary-`.
    pub name_prefix: String,
    /// Image name suffix. A leading hyphen is prepended when missing.
    /// Defaults to empty.
    pub name_suffix: String,
    /// Image tag. Defaults to `latest`.
    pub tag: String,
    /// Neutron driver selector used by template conditionals. Defaults to
    /// unset.
    pub neutron_driver: Option<String>,
    /// Logging backend selector used by template conditionals. Defaults to
    /// `files`.
    pub logging: String,
    /// Registry to push resolved images to. Rendered as an empty string when
    /// unset, which drops the field from affected entries.
    pub push_destination: Option<String>,
}

impl Default for TemplateVars {
    fn default() -> Self {
        Self {
            namespace: String::from("docker.io/tripleoupstream"),
            ceph_namespace: String::from("docker.io/ceph"),
            ceph_image: String::from("daemon"),
            ceph_tag: String::from("tag-stable-3.0-luminous-centos-7"),
            name_prefix: String::from("centos-binary-"),
            name_suffix: String::new(),
            tag: String::from("latest"),
            neutron_driver: None,
            logging: String::from("files"),
            push_destination: None,
        }
    }
}

impl TemplateVars {
    /// Builds the rendering context, padding the name prefix and suffix with
    /// their joining hyphens.
    fn context(&self) -> Context {
        let mut context = Context::new();
        context.insert("namespace", &self.namespace);
        context.insert("ceph_namespace", &self.ceph_namespace);
        context.insert("ceph_image", &self.ceph_image);
        context.insert("ceph_tag", &self.ceph_tag);
        context.insert("name_prefix", &pad_name_prefix(&self.name_prefix));
        context.insert("name_suffix", &pad_name_suffix(&self.name_suffix));
        context.insert("tag", &self.tag);
        context.insert("neutron_driver", &self.neutron_driver);
        context.insert("logging", &self.logging);
        context.insert(
            "push_destination",
            self.push_destination.as_deref().unwrap_or(""),
        );
        context
    }
}

fn pad_name_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('-') {
        prefix.to_owned()
    } else {
        format!("{prefix}-")
    }
}

fn pad_name_suffix(suffix: &str) -> String {
    if suffix.is_empty() || suffix.starts_with('-') {
        suffix.to_owned()
    } else {
        format!("-{suffix}")
    }
}

/// Templated manifest document shape.
#[derive(Debug, Deserialize)]
struct TemplateManifest {
    container_images_template: Vec<ImageEntry>,
}

/// Plain manifest document shape.
#[derive(Debug, Deserialize)]
struct Manifest {
    container_images: Vec<ImageEntry>,
}

/// Renders a templated manifest and returns its resolved entries.
///
/// # Errors
///
/// Returns [`ImageError::Template`] when rendering fails and
/// [`ImageError::Manifest`] when the rendered document cannot be parsed.
pub fn resolve_template(
    template: &str,
    vars: &TemplateVars,
) -> Result<Vec<ImageEntry>, ImageError> {
    resolve_template_filtered(template, vars, Some)
}

/// Renders a templated manifest, passing each entry through `filter`.
///
/// The filter may drop an entry by returning `None` or rewrite it in place.
/// After filtering, entries whose `push_destination` rendered empty lose that
/// field, and entries sharing a logical image name are deduplicated with the
/// first occurrence winning.
///
/// # Errors
///
/// Returns [`ImageError::Template`] when rendering fails and
/// [`ImageError::Manifest`] when the rendered document cannot be parsed.
pub fn resolve_template_filtered<F>(
    template: &str,
    vars: &TemplateVars,
    mut filter: F,
) -> Result<Vec<ImageEntry>, ImageError>
where
    F: FnMut(ImageEntry) -> Option<ImageEntry>,
{
    let rendered =
        Tera::one_off(template, &vars.context(), false).map_err(|err| ImageError::Template {
            message: err.to_string(),
        })?;
    let manifest: TemplateManifest =
        serde_yaml::from_str(&rendered).map_err(|err| ImageError::Manifest {
            message: err.to_string(),
        })?;

    let mut seen_names = Vec::new();
    let mut entries = Vec::new();
    for raw in manifest.container_images_template {
        let Some(mut entry) = filter(raw) else {
            continue;
        };
        if entry.push_destination.as_deref().is_some_and(str::is_empty) {
            entry.push_destination = None;
        }
        if let Some(logical) = logical_image_name(&entry.imagename) {
            if seen_names.contains(&logical) {
                continue;
            }
            seen_names.push(logical);
        }
        entries.push(entry);
    }
    Ok(entries)
}

/// Reads a templated manifest file and returns its resolved entries.
///
/// # Errors
///
/// Returns [`ImageError::FileRead`] when the file cannot be read, plus any
/// error from [`resolve_template`].
pub fn resolve_template_file(
    path: &str,
    vars: &TemplateVars,
) -> Result<Vec<ImageEntry>, ImageError> {
    let expanded = expand_tilde(path);
    let template = read_to_string_ambient(&expanded).map_err(|message| ImageError::FileRead {
        path: expanded.clone(),
        message,
    })?;
    resolve_template(&template, vars)
}

/// Reads a plain manifest file and returns its entries unmodified.
///
/// # Errors
///
/// Returns [`ImageError::FileRead`] when the file cannot be read and
/// [`ImageError::Manifest`] when it cannot be parsed.
pub fn load_manifest(path: &str) -> Result<Vec<ImageEntry>, ImageError> {
    let expanded = expand_tilde(path);
    let text = read_to_string_ambient(&expanded).map_err(|message| ImageError::FileRead {
        path: expanded.clone(),
        message,
    })?;
    let manifest: Manifest = serde_yaml::from_str(&text).map_err(|err| ImageError::Manifest {
        message: err.to_string(),
    })?;
    Ok(manifest.container_images)
}

/// Maps a concrete image reference to its bare logical name.
///
/// The registry prefix, tag, distribution prefix, and install-type prefix are
/// stripped in turn, so `tripleo/centos-binary-foo:latest` becomes `foo` while
/// an already-bare `foo` is returned unchanged. Returns `None` when nothing
/// remains after stripping.
#[must_use]
pub fn logical_image_name(imagename: &str) -> Option<String> {
    let base = imagename.rsplit('/').next().unwrap_or(imagename);
    let untagged = base.split(':').next().unwrap_or(base);
    let without_distro = strip_first_prefix(untagged, &["centos-", "rhel-"]);
    let bare = strip_first_prefix(without_distro, &["binary-", "source-", "rdo-", "rhos-"]);
    if bare.is_empty() {
        None
    } else {
        Some(bare.to_owned())
    }
}

fn strip_first_prefix<'a>(name: &'a str, prefixes: &[&str]) -> &'a str {
    for prefix in prefixes {
        if let Some(rest) = name.strip_prefix(prefix) {
            return rest;
        }
    }
    name
}
