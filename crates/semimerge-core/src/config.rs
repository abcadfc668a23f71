use serde::{Deserialize, Serialize};
use std::path::Path;

use semimerge_engine::{Language, MarkerStyle, MergeConfig};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub merge: MergeSettings,
    #[serde(default)]
    pub run: RunSettings,
    #[serde(default)]
    pub output: OutputSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeSettings {
    /// Attempt the structural engine before falling back to diff3.
    #[serde(default = "default_true")]
    pub structural: bool,
    #[serde(default = "default_true")]
    pub show_base: bool,
    #[serde(default = "default_left_label")]
    pub left_label: String,
    #[serde(default = "default_base_label")]
    pub base_label: String,
    #[serde(default = "default_right_label")]
    pub right_label: String,
    /// Languages merged structurally, by name. Empty means every supported one.
    #[serde(default)]
    pub languages: Vec<String>,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            structural: true,
            show_base: true,
            left_label: default_left_label(),
            base_label: default_base_label(),
            right_label: default_right_label(),
            languages: Vec::new(),
        }
    }
}

impl MergeSettings {
    pub fn merge_config(&self) -> MergeConfig {
        MergeConfig {
            structural: self.structural,
            style: MarkerStyle {
                left_label: self.left_label.clone(),
                base_label: self.base_label.clone(),
                right_label: self.right_label.clone(),
                show_base: self.show_base,
            },
        }
    }

    /// Grammar to use for a path, honoring the `languages` allow-list.
    pub fn language_for(&self, path: &Path) -> Option<Language> {
        Language::from_path(path)
            .filter(|lang| self.languages.is_empty() || self.languages.iter().any(|l| l == lang.as_str()))
    }
}

/// What a scenario run does when one file fails fatally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FatalPolicy {
    /// Stop dispatching and fail the whole run.
    #[default]
    Abort,
    /// Record the error on the file and keep merging the others.
    Continue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSettings {
    /// Concurrent file merges. Unset means available parallelism.
    #[serde(default)]
    pub jobs: Option<usize>,
    #[serde(default)]
    pub fatal_policy: FatalPolicy,
}

impl RunSettings {
    pub fn jobs(&self) -> usize {
        self.jobs
            .filter(|&n| n > 0)
            .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Print merged files when no output path is given.
    #[serde(default = "default_true")]
    pub print_on_screen: bool,
    /// Append run statistics to `statistics.jsonl` in the data directory.
    #[serde(default = "default_true")]
    pub statistics: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            print_on_screen: true,
            statistics: true,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_left_label() -> String {
    "LEFT".into()
}
fn default_base_label() -> String {
    "BASE".into()
}
fn default_right_label() -> String {
    "RIGHT".into()
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings when the file exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "merge": { "show_base": false }, "run": { "fatal_policy": "continue" } }"#)
                .unwrap();
        assert!(settings.merge.structural);
        assert!(!settings.merge.show_base);
        assert_eq!(settings.merge.left_label, "LEFT");
        assert_eq!(settings.run.fatal_policy, FatalPolicy::Continue);
        assert!(settings.output.print_on_screen);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let mut settings = Settings::default();
        settings.run.jobs = Some(3);
        settings.merge.languages = vec!["java".into()];
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.run.jobs(), 3);
        assert_eq!(loaded.merge.languages, vec!["java".to_string()]);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_or_default(&dir.path().join("settings.json")).unwrap();
        assert!(settings.merge.structural);
        assert!(settings.run.jobs() >= 1);
    }

    #[test]
    fn test_language_allow_list() {
        let mut merge = MergeSettings::default();
        assert_eq!(merge.language_for(Path::new("A.java")), Some(Language::Java));
        merge.languages = vec!["python".into()];
        assert_eq!(merge.language_for(Path::new("A.java")), None);
        assert_eq!(merge.language_for(Path::new("a.py")), Some(Language::Python));
    }

    #[test]
    fn test_merge_config_labels() {
        let merge = MergeSettings {
            left_label: "MINE".into(),
            show_base: false,
            ..MergeSettings::default()
        };
        let config = merge.merge_config();
        assert_eq!(config.style.left_label, "MINE");
        assert!(!config.style.show_base);
    }
}
