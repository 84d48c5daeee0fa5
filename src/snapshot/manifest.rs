//! File-backed snapshot producer.
//!
//! The host describes the observed application in a site manifest (TOML, or
//! JSON when the file ends in `.json`). Every cache miss re-reads the file and
//! assembles the snapshot document from it, applying the policy's disclosure
//! switches.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::clock::Clock;
use crate::config::AccessPolicy;
use crate::snapshot::producer::{ProducerError, SnapshotProducer};

/// Everything the host knows about the application.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SiteManifest {
    pub site: SiteInfo,
    pub environment: EnvironmentInfo,
    /// Extra boolean or string flags, reported as-is.
    pub flags: BTreeMap<String, Value>,
    pub theme: ThemeInfo,
    pub plugins: PluginInventory,
    pub updates: UpdateMetadata,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SiteInfo {
    pub home_url: String,
    pub site_url: String,
    pub multisite: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EnvironmentInfo {
    pub framework_version: String,
    pub runtime_version: String,
    pub db_server: String,
    pub db_version: String,
    pub environment_type: String,
    pub locale: String,
}

impl Default for EnvironmentInfo {
    fn default() -> Self {
        Self {
            framework_version: String::new(),
            runtime_version: String::new(),
            db_server: String::new(),
            db_version: String::new(),
            environment_type: "production".to_string(),
            locale: "en_US".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ThemeDetails {
    pub name: String,
    pub version: String,
    pub stylesheet: String,
    pub template: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ThemeInfo {
    #[serde(flatten)]
    pub details: ThemeDetails,
    pub parent: Option<ThemeDetails>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub plugin_file: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PluginInventory {
    /// Every installed plugin.
    pub installed: Vec<PluginInfo>,
    /// Plugin files active on this site.
    pub active: Vec<String>,
    /// Plugin files active network-wide.
    pub network_active: Vec<String>,
    /// Must-use plugins, always loaded.
    pub mu: Vec<PluginInfo>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PluginUpdate {
    pub new_version: String,
    pub url: String,
    pub package: String,
    pub slug: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ThemeUpdate {
    pub new_version: String,
    pub url: String,
    pub package: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CoreUpdate {
    /// Only `"upgrade"` entries are reported.
    pub response: String,
    pub version: String,
    pub package: String,
    pub locale: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct UpdateMetadata {
    /// Keyed by plugin file.
    pub plugins: BTreeMap<String, PluginUpdate>,
    /// Keyed by theme stylesheet.
    pub themes: BTreeMap<String, ThemeUpdate>,
    pub core: Vec<CoreUpdate>,
}

impl SiteManifest {
    /// Read and parse a manifest file.
    pub fn load(path: &Path) -> Result<Self, ProducerError> {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ProducerError::Io {
            path: display.clone(),
            source,
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_str(&content).map_err(|e| ProducerError::Parse {
                path: display,
                message: e.to_string(),
            })
        } else {
            toml::from_str(&content).map_err(|e| ProducerError::Parse {
                path: display,
                message: e.to_string(),
            })
        }
    }

    /// Assemble the snapshot document.
    pub fn to_snapshot(&self, policy: &AccessPolicy, generated_at: DateTime<Utc>) -> Value {
        let expose_updates = policy.expose_updates;
        let env = &self.environment;

        let (db_server, db_version) = if policy.expose_database_version {
            (env.db_server.as_str(), env.db_version.as_str())
        } else {
            ("", "")
        };

        let mut flags: Map<String, Value> = self
            .flags
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        flags.insert("MULTISITE".into(), Value::Bool(self.site.multisite));
        flags.insert(
            "ENVIRONMENT_TYPE".into(),
            Value::String(env.environment_type.clone()),
        );

        let theme = &self.theme;
        let theme_update = self.updates.themes.get(&theme.details.stylesheet);
        let mut theme_json = json!({
            "name": theme.details.name,
            "version": theme.details.version,
            "stylesheet": theme.details.stylesheet,
            "template": theme.details.template,
            "is_child": theme.parent.is_some(),
            "update_available": theme_update.is_some(),
            "update": disclosed(expose_updates, theme_update),
        });
        if let (Some(parent), Some(obj)) = (&theme.parent, theme_json.as_object_mut()) {
            obj.insert("parent".into(), json!(parent));
        }

        let active_plugins: Vec<Value> = self
            .active_plugin_files()
            .into_iter()
            .filter_map(|file| {
                let info = self.plugins.installed.iter().find(|p| p.plugin_file == file)?;
                let update = self.updates.plugins.get(file);
                Some(json!({
                    "name": info.name,
                    "version": info.version,
                    "plugin_file": info.plugin_file,
                    "network_active": self.plugins.network_active.iter().any(|f| f == file),
                    "update_available": update.is_some(),
                    "update": disclosed(expose_updates, update),
                }))
            })
            .collect();

        let mut snapshot = json!({
            "generated_at": generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            "site": {
                "home_url": self.site.home_url,
                "site_url": self.site.site_url,
                "multisite": self.site.multisite,
            },
            "environment": {
                "framework_version": env.framework_version,
                "runtime_version": env.runtime_version,
                "db_server": db_server,
                "db_version": db_version,
                "environment_type": env.environment_type,
                "locale": env.locale,
                "service_version": env!("CARGO_PKG_VERSION"),
            },
            "flags": flags,
            "theme": theme_json,
            "plugins": {
                "active": active_plugins,
                "mu": self.plugins.mu,
            },
        });

        if expose_updates {
            let core: Vec<Value> = self
                .updates
                .core
                .iter()
                .filter(|u| u.response == "upgrade")
                .map(|u| {
                    json!({
                        "version": u.version,
                        "package": u.package,
                        "locale": u.locale,
                        "current": env.framework_version,
                    })
                })
                .collect();
            if let Some(obj) = snapshot.as_object_mut() {
                obj.insert(
                    "updates".into(),
                    json!({
                        "core": { "updates": core },
                        "plugins": self.updates.plugins,
                        "themes": self.updates.themes,
                    }),
                );
            }
        }

        snapshot
    }

    /// Site-active then network-active files, each once, in that order.
    fn active_plugin_files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = Vec::new();
        for file in self
            .plugins
            .active
            .iter()
            .chain(self.plugins.network_active.iter())
        {
            if !files.contains(&file.as_str()) {
                files.push(file.as_str());
            }
        }
        files
    }
}

fn disclosed<T: Serialize>(expose: bool, update: Option<&T>) -> Value {
    match update {
        Some(u) if expose => json!(u),
        _ => json!({}),
    }
}

/// Produces snapshots from a manifest file on disk.
pub struct ManifestProducer {
    path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl ManifestProducer {
    pub fn new(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            clock,
        }
    }
}

impl SnapshotProducer for ManifestProducer {
    fn produce(&self, policy: &AccessPolicy) -> Result<Value, ProducerError> {
        let manifest = SiteManifest::load(&self.path)?;
        let secs = i64::try_from(self.clock.now_secs()).unwrap_or(i64::MAX);
        let generated_at = DateTime::from_timestamp(secs, 0).unwrap_or_default();
        tracing::debug!(path = %self.path.display(), "Snapshot rebuilt from manifest");
        Ok(manifest.to_snapshot(policy, generated_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::schema::PolicyConfig;
    use std::io::Write;

    const MANIFEST: &str = r#"
        [site]
        home_url = "https://example.com/"
        site_url = "https://example.com/"

        [environment]
        framework_version = "6.6.2"
        runtime_version = "8.2.12"
        db_server = "MariaDB"
        db_version = "10.11.6"

        [flags]
        DEBUG = false

        [theme]
        name = "Child"
        version = "1.0"
        stylesheet = "child"
        template = "parent"

        [theme.parent]
        name = "Parent"
        version = "2.1"
        stylesheet = "parent"
        template = "parent"

        [plugins]
        active = ["akismet/akismet.php", "missing/missing.php"]
        network_active = ["akismet/akismet.php", "net/net.php"]

        [[plugins.installed]]
        name = "Akismet"
        version = "5.3"
        plugin_file = "akismet/akismet.php"

        [[plugins.installed]]
        name = "Network Tool"
        version = "0.9"
        plugin_file = "net/net.php"

        [[plugins.mu]]
        name = "Loader"
        version = "1"
        plugin_file = "loader.php"

        [updates.plugins."akismet/akismet.php"]
        new_version = "5.4"
        slug = "akismet"

        [updates.themes.child]
        new_version = "1.1"

        [[updates.core]]
        response = "upgrade"
        version = "6.7"

        [[updates.core]]
        response = "latest"
        version = "6.6.2"
    "#;

    fn manifest() -> SiteManifest {
        toml::from_str(MANIFEST).unwrap()
    }

    fn at() -> DateTime<Utc> {
        DateTime::from_timestamp(1_760_000_000, 0).unwrap()
    }

    #[test]
    fn test_default_policy_hides_updates() {
        let snap = manifest().to_snapshot(&AccessPolicy::default(), at());
        assert_eq!(snap["generated_at"], "2025-10-09T08:53:20Z");
        assert_eq!(snap["environment"]["framework_version"], "6.6.2");
        assert_eq!(snap["environment"]["db_server"], "MariaDB");
        assert!(snap.get("updates").is_none());
        assert_eq!(snap["flags"]["MULTISITE"], false);
        assert_eq!(snap["flags"]["ENVIRONMENT_TYPE"], "production");
        assert_eq!(snap["flags"]["DEBUG"], false);

        let theme = &snap["theme"];
        assert_eq!(theme["is_child"], true);
        assert_eq!(theme["parent"]["name"], "Parent");
        assert_eq!(theme["update_available"], true);
        assert_eq!(theme["update"], json!({}));
    }

    #[test]
    fn test_active_plugins_merge_network_active() {
        let snap = manifest().to_snapshot(&AccessPolicy::default(), at());
        let active = snap["plugins"]["active"].as_array().unwrap();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0]["plugin_file"], "akismet/akismet.php");
        assert_eq!(active[0]["network_active"], true);
        assert_eq!(active[0]["update_available"], true);
        assert_eq!(active[1]["plugin_file"], "net/net.php");
        assert_eq!(active[1]["network_active"], true);
        assert_eq!(active[1]["update_available"], false);
        assert_eq!(snap["plugins"]["mu"][0]["name"], "Loader");
    }

    #[test]
    fn test_disclosure_switches() {
        let policy = AccessPolicy::from_config(&PolicyConfig {
            expose_updates: true,
            expose_database_version: false,
            ..PolicyConfig::default()
        });
        let snap = manifest().to_snapshot(&policy, at());
        assert_eq!(snap["environment"]["db_server"], "");
        assert_eq!(snap["environment"]["db_version"], "");
        assert_eq!(snap["plugins"]["active"][0]["update"]["new_version"], "5.4");

        let core = snap["updates"]["core"]["updates"].as_array().unwrap();
        assert_eq!(core.len(), 1);
        assert_eq!(core[0]["version"], "6.7");
        assert_eq!(core[0]["current"], "6.6.2");
        assert_eq!(snap["updates"]["themes"]["child"]["new_version"], "1.1");
    }

    #[test]
    fn test_producer_reads_json_and_toml() {
        let clock = Arc::new(ManualClock::new(1_760_000_000));
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("site.toml");
        std::fs::write(&toml_path, MANIFEST).unwrap();
        let snap = ManifestProducer::new(&toml_path, clock.clone())
            .produce(&AccessPolicy::default())
            .unwrap();
        assert_eq!(snap["site"]["home_url"], "https://example.com/");

        let json_path = dir.path().join("site.json");
        let mut f = std::fs::File::create(&json_path).unwrap();
        f.write_all(br#"{"environment": {"framework_version": "7.0"}}"#).unwrap();
        let snap = ManifestProducer::new(&json_path, clock)
            .produce(&AccessPolicy::default())
            .unwrap();
        assert_eq!(snap["environment"]["framework_version"], "7.0");
        assert_eq!(snap["environment"]["locale"], "en_US");
    }

    #[test]
    fn test_missing_manifest_is_an_error() {
        let producer = ManifestProducer::new(
            "/definitely/not/here.toml",
            Arc::new(ManualClock::new(0)),
        );
        assert!(matches!(
            producer.produce(&AccessPolicy::default()),
            Err(ProducerError::Io { .. })
        ));
    }

    #[test]
    fn test_example_manifest_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("site-manifest.example.toml");
        let manifest = SiteManifest::load(&path).unwrap();
        let snap = manifest.to_snapshot(&AccessPolicy::default(), at());
        assert_eq!(snap["plugins"]["active"][0]["update_available"], true);
        assert_eq!(snap["plugins"]["mu"][0]["name"], "Object Cache Loader");
    }
}
