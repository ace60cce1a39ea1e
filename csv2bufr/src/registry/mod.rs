//! Template Registry - Store and look up mapping templates by name
//!
//! Templates are `<name>.json` files. Lookup walks, in order:
//!
//! 1. the directory named by `CSV2BUFR_TEMPLATES` (read-only)
//! 2. the writable store (`CSV2BUFR_TEMPLATE_DIR`, default `.csv2bufr/templates`)
//! 3. templates bundled with the crate
//!
//! The first match wins. Import and delete only touch the store.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::{RegistryError, RegistryResult};
use crate::transform::mapping::MappingTemplate;

/// Templates compiled into the binary.
const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("aws-template", include_str!("../../templates/aws-template.json")),
    ("daycli-template", include_str!("../../templates/daycli-template.json")),
];

/// Where a template was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "path")]
pub enum TemplateOrigin {
    SearchPath(PathBuf),
    Store(PathBuf),
    Builtin,
}

/// A template listed by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateEntry {
    pub name: String,
    pub origin: TemplateOrigin,
}

/// Registry over the template search path.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    search_dirs: Vec<PathBuf>,
    store_dir: PathBuf,
    builtins: bool,
}

impl TemplateRegistry {
    /// Registry configured from environment settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            search_dirs: settings.templates_path.iter().cloned().collect(),
            store_dir: settings.template_dir.clone(),
            builtins: true,
        }
    }

    /// Registry with explicit directories and no bundled templates.
    pub fn with_dirs(search_dirs: Vec<PathBuf>, store_dir: impl AsRef<Path>) -> Self {
        Self {
            search_dirs,
            store_dir: store_dir.as_ref().to_path_buf(),
            builtins: false,
        }
    }

    /// Include or exclude the bundled templates.
    pub fn with_builtins(mut self, enable: bool) -> Self {
        self.builtins = enable;
        self
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// All templates, sorted by name. Shadowed templates are not listed.
    pub fn list(&self) -> Vec<TemplateEntry> {
        let mut found: BTreeMap<String, TemplateOrigin> = BTreeMap::new();

        for dir in &self.search_dirs {
            for name in json_stems(dir) {
                let path = dir.join(format!("{}.json", name));
                found.entry(name).or_insert(TemplateOrigin::SearchPath(path));
            }
        }
        for name in json_stems(&self.store_dir) {
            let path = self.store_dir.join(format!("{}.json", name));
            found.entry(name).or_insert(TemplateOrigin::Store(path));
        }
        if self.builtins {
            for (name, _) in BUILTIN_TEMPLATES {
                found.entry(name.to_string()).or_insert(TemplateOrigin::Builtin);
            }
        }

        found
            .into_iter()
            .map(|(name, origin)| TemplateEntry { name, origin })
            .collect()
    }

    /// Where a template would be loaded from. Names that are not plain slugs never match.
    pub fn locate(&self, name: &str) -> Option<TemplateOrigin> {
        if check_name(name).is_err() {
            return None;
        }
        let file = format!("{}.json", name);
        for dir in &self.search_dirs {
            let path = dir.join(&file);
            if path.is_file() {
                return Some(TemplateOrigin::SearchPath(path));
            }
        }
        let path = self.store_dir.join(&file);
        if path.is_file() {
            return Some(TemplateOrigin::Store(path));
        }
        if self.builtins && BUILTIN_TEMPLATES.iter().any(|(n, _)| *n == name) {
            return Some(TemplateOrigin::Builtin);
        }
        None
    }

    /// Raw JSON of a template.
    pub fn get_raw(&self, name: &str) -> RegistryResult<Value> {
        check_name(name)?;
        let content = match self.locate(name) {
            Some(TemplateOrigin::SearchPath(path)) | Some(TemplateOrigin::Store(path)) => fs::read_to_string(path)?,
            Some(TemplateOrigin::Builtin) => BUILTIN_TEMPLATES
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, json)| json.to_string())
                .ok_or_else(|| RegistryError::NotFound(name.to_string()))?,
            None => return Err(RegistryError::NotFound(name.to_string())),
        };
        Ok(serde_json::from_str(&content)?)
    }

    /// Load and validate a template by name.
    pub fn get(&self, name: &str) -> RegistryResult<MappingTemplate> {
        let raw = self.get_raw(name)?;
        MappingTemplate::load(&raw).map_err(|source| RegistryError::InvalidTemplate {
            name: name.to_string(),
            source,
        })
    }

    /// Load a template given either a file path or a registry name.
    pub fn resolve(&self, name_or_path: &str) -> RegistryResult<MappingTemplate> {
        let path = Path::new(name_or_path);
        if path.is_file() {
            debug!(path = %path.display(), "loading template from file");
            return MappingTemplate::from_path(path).map_err(|source| RegistryError::InvalidTemplate {
                name: name_or_path.to_string(),
                source,
            });
        }
        self.get(name_or_path)
    }

    /// Validate a template and write it to the store under `name`.
    ///
    /// Returns the stored name.
    pub fn save(&self, name: &str, raw: &Value) -> RegistryResult<String> {
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        let name = slug;
        MappingTemplate::load(raw).map_err(|source| RegistryError::InvalidTemplate {
            name: name.clone(),
            source,
        })?;

        fs::create_dir_all(&self.store_dir)?;
        let path = self.store_dir.join(format!("{}.json", name));
        fs::write(&path, serde_json::to_string_pretty(raw)?)?;

        info!(name = %name, path = %path.display(), "template saved");
        Ok(name)
    }

    /// Import a template file. The name defaults to the file stem.
    pub fn import(&self, path: &Path, name: Option<&str>) -> RegistryResult<String> {
        let content = fs::read_to_string(path)?;
        let raw: Value = serde_json::from_str(&content)?;

        let name = name.unwrap_or_else(|| path.file_stem().and_then(|s| s.to_str()).unwrap_or("imported"));
        self.save(name, &raw)
    }

    /// Remove a template from the store.
    pub fn delete(&self, name: &str) -> RegistryResult<()> {
        check_name(name)?;
        let path = self.store_dir.join(format!("{}.json", name));
        if !path.is_file() {
            return Err(RegistryError::NotFound(name.to_string()));
        }
        fs::remove_file(&path)?;
        info!(name = %name, "template deleted");
        Ok(())
    }

    /// Templates whose referenced CSV columns appear in `csv_columns`.
    ///
    /// Score is the fraction of referenced columns present (case-insensitive).
    /// Only scores above 0.5 are returned, best first.
    pub fn find_compatible(&self, csv_columns: &[String]) -> Vec<(String, f64)> {
        let mut compatible: Vec<(String, f64)> = self
            .list()
            .into_iter()
            .filter_map(|entry| {
                let template = self.get(&entry.name).ok()?;
                let score = compatibility(&template.source_columns(), csv_columns);
                (score > 0.5).then_some((entry.name, score))
            })
            .collect();

        compatible.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        compatible
    }
}

/// Fraction of `referenced` columns found in `csv`.
fn compatibility(referenced: &[String], csv: &[String]) -> f64 {
    if referenced.is_empty() {
        return 0.0;
    }

    let csv_lower: Vec<String> = csv.iter().map(|c| c.to_lowercase()).collect();
    let match_count = referenced
        .iter()
        .filter(|col| csv_lower.contains(&col.to_lowercase()))
        .count();

    match_count as f64 / referenced.len() as f64
}

fn json_stems(dir: &Path) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return Vec::new(),
    };

    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|e| e == "json"))
        .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
        .collect()
}

/// Lowercase, alphanumerics, `-` and `_` kept; other runs become `-`.
/// Registry names are slugs, so they cannot address files outside the registry directories.
fn check_name(name: &str) -> RegistryResult<()> {
    if name.is_empty() || slugify(name) != name {
        return Err(RegistryError::InvalidName(name.to_string()));
    }
    Ok(())
}

static NON_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w]+").expect("valid slug pattern"));

fn slugify(name: &str) -> String {
    NON_SLUG
        .replace_all(&name.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn mapping(column: &str) -> Value {
        json!({
            "inputDelayedDescriptorReplicationFactor": [],
            "header": [{ "eccodes_key": "edition", "value": "const:4" }],
            "data": [
                { "eccodes_key": "#1#airTemperature", "value": format!("data:{}", column) },
                { "eccodes_key": "#1#pressure", "value": "data:pressure" }
            ]
        })
    }

    #[test]
    fn test_save_get_delete() {
        let store = tempdir().unwrap();
        let registry = TemplateRegistry::with_dirs(vec![], store.path());

        let name = registry.save("My Station", &mapping("temp")).unwrap();
        assert_eq!(name, "my-station");
        assert!(store.path().join("my-station.json").is_file());

        let template = registry.get("my-station").unwrap();
        assert_eq!(template.data.len(), 2);

        registry.delete("my-station").unwrap();
        assert!(matches!(registry.get("my-station"), Err(RegistryError::NotFound(_))));
        assert!(matches!(registry.delete("my-station"), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn test_invalid_template_not_saved() {
        let store = tempdir().unwrap();
        let registry = TemplateRegistry::with_dirs(vec![], store.path());
        let result = registry.save("bad", &json!({ "header": [] }));
        assert!(matches!(result, Err(RegistryError::InvalidTemplate { .. })));
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_search_path_shadows_store() {
        let search = tempdir().unwrap();
        let store = tempdir().unwrap();
        fs::write(search.path().join("synop.json"), mapping("t_search").to_string()).unwrap();
        fs::write(store.path().join("synop.json"), mapping("t_store").to_string()).unwrap();
        fs::write(store.path().join("buoy.json"), mapping("sst").to_string()).unwrap();

        let registry = TemplateRegistry::with_dirs(vec![search.path().to_path_buf()], store.path());
        let names: Vec<String> = registry.list().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["buoy", "synop"]);

        let template = registry.get("synop").unwrap();
        assert_eq!(template.data[0].value.column(), Some("t_search"));
        assert!(matches!(registry.locate("synop"), Some(TemplateOrigin::SearchPath(_))));
    }

    #[test]
    fn test_import_uses_file_stem() {
        let src = tempdir().unwrap();
        let store = tempdir().unwrap();
        let path = src.path().join("malawi_synop.json");
        fs::write(&path, mapping("temp").to_string()).unwrap();

        let registry = TemplateRegistry::with_dirs(vec![], store.path());
        assert_eq!(registry.import(&path, None).unwrap(), "malawi_synop");
        assert_eq!(registry.import(&path, Some("renamed")).unwrap(), "renamed");
        assert_eq!(registry.list().len(), 2);
    }

    #[test]
    fn test_resolve_accepts_path_or_name() {
        let store = tempdir().unwrap();
        let registry = TemplateRegistry::with_dirs(vec![], store.path());
        registry.save("named", &mapping("temp")).unwrap();

        assert!(registry.resolve("named").is_ok());
        let path = store.path().join("named.json");
        assert!(registry.resolve(path.to_str().unwrap()).is_ok());
        assert!(registry.resolve("nothing").is_err());
    }

    #[test]
    fn test_builtins_listed_last() {
        let store = tempdir().unwrap();
        let registry = TemplateRegistry::with_dirs(vec![], store.path()).with_builtins(true);
        let entries = registry.list();
        assert!(entries
            .iter()
            .any(|e| e.name == "aws-template" && e.origin == TemplateOrigin::Builtin));
        assert!(registry.get("aws-template").is_ok());
        assert!(registry.get("daycli-template").is_ok());
    }

    #[test]
    fn test_find_compatible() {
        let store = tempdir().unwrap();
        let registry = TemplateRegistry::with_dirs(vec![], store.path());
        registry.save("full", &mapping("temp")).unwrap();
        registry.save("half", &mapping("dewpoint")).unwrap();

        let columns = vec!["TEMP".to_string(), "pressure".to_string()];
        let matches = registry.find_compatible(&columns);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].0, "full");
        assert!((matches[0].1 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_compatibility_score() {
        let referenced = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let csv = vec!["A".to_string(), "b".to_string()];
        assert!((compatibility(&referenced, &csv) - 0.666).abs() < 0.01);
        assert_eq!(compatibility(&[], &csv), 0.0);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("My Station"), "my-station");
        assert_eq!(slugify("  aws / synop--v2 "), "aws-synop-v2");
        assert_eq!(slugify("malawi_synop"), "malawi_synop");
        assert_eq!(slugify("///"), "");
    }

    #[test]
    fn test_names_cannot_leave_the_store() {
        let outside = tempdir().unwrap();
        let store = tempdir().unwrap();
        fs::write(outside.path().join("secret.json"), r#"{"api_key":"hunter2"}"#).unwrap();
        let registry = TemplateRegistry::with_dirs(vec![], store.path());

        let absolute = outside.path().join("secret");
        let absolute = absolute.to_str().unwrap();
        assert!(matches!(registry.get_raw(absolute), Err(RegistryError::InvalidName(_))));
        assert!(matches!(registry.get_raw("../secret"), Err(RegistryError::InvalidName(_))));
        assert!(matches!(registry.get("..\\secret"), Err(RegistryError::InvalidName(_))));
        assert!(matches!(registry.delete(absolute), Err(RegistryError::InvalidName(_))));
        assert_eq!(registry.locate(absolute), None);
        assert!(outside.path().join("secret.json").is_file());
    }
}
