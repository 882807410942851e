//! Gallery of curated fractals with JSON persistence.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::fitness::FitnessBreakdown;
use crate::schema::Genome;

/// Base used for generated entry names.
const DEFAULT_NAME: &str = "Fractal";

/// On-disk format version.
const GALLERY_VERSION: u32 = 1;

/// Gallery persistence errors.
#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("gallery I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("gallery JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported gallery version {0}")]
    UnsupportedVersion(u32),
}

/// A stored fractal with metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryEntry {
    pub genome: Genome,
    pub fitness: f32,
    /// Unique within the gallery.
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Generation the genome was born in.
    pub generation: u32,
    /// Seconds since the Unix epoch.
    pub created_at: u64,
    /// Per-metric scores, keyed by metric name.
    #[serde(default)]
    pub fitness_breakdown: BTreeMap<String, f32>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct GalleryFile {
    version: u32,
    entries: Vec<GalleryEntry>,
}

/// Collection of the best fractals found across runs.
#[derive(Debug, Clone, Default)]
pub struct FractalGallery {
    entries: Vec<GalleryEntry>,
}

impl FractalGallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a genome and return the name it was stored under.
    ///
    /// An empty or already used `name` is replaced by a unique variant.
    pub fn add(&mut self, genome: &Genome, fitness: f32, name: &str, description: &str) -> String {
        let base = if name.is_empty() { DEFAULT_NAME } else { name };
        let name = self.unique_name(base);

        self.entries.push(GalleryEntry {
            genome: genome.clone(),
            fitness,
            name: name.clone(),
            description: description.to_string(),
            generation: genome.generation,
            created_at: unix_now(),
            fitness_breakdown: BTreeMap::new(),
            tags: Vec::new(),
        });

        name
    }

    /// Remove an entry by name.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.name != name);
        self.entries.len() != before
    }

    pub fn find(&self, name: &str) -> Option<&GalleryEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut GalleryEntry> {
        self.entries.iter_mut().find(|e| e.name == name)
    }

    /// Entries in insertion order.
    pub fn all(&self) -> &[GalleryEntry] {
        &self.entries
    }

    /// Top `n` entries by fitness.
    pub fn top(&self, n: usize) -> Vec<&GalleryEntry> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by(|a, b| b.fitness.total_cmp(&a.fitness));
        entries.truncate(n);
        entries
    }

    /// Entries carrying any of the comma or whitespace separated tags in `query`.
    pub fn search_by_tags(&self, query: &str) -> Vec<&GalleryEntry> {
        let wanted: Vec<&str> = query
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .collect();

        self.entries
            .iter()
            .filter(|e| e.tags.iter().any(|t| wanted.contains(&t.as_str())))
            .collect()
    }

    /// Entries born within `min..=max`.
    pub fn by_generation(&self, min: u32, max: u32) -> Vec<&GalleryEntry> {
        self.entries
            .iter()
            .filter(|e| (min..=max).contains(&e.generation))
            .collect()
    }

    /// Attach the per-metric scores of an evaluation.
    pub fn set_breakdown(&mut self, name: &str, breakdown: &FitnessBreakdown) -> bool {
        let Some(entry) = self.find_mut(name) else {
            return false;
        };
        entry.fitness_breakdown = breakdown
            .metrics
            .iter()
            .map(|r| (r.metric.name().to_string(), r.score))
            .collect();
        true
    }

    /// Add tags to an entry, skipping ones it already has.
    pub fn add_tags(&mut self, name: &str, tags: &[&str]) -> bool {
        let Some(entry) = self.find_mut(name) else {
            return false;
        };
        for tag in tags {
            if !entry.tags.iter().any(|t| t == tag) {
                entry.tags.push((*tag).to_string());
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mean fitness, zero when empty.
    pub fn average_fitness(&self) -> f32 {
        if self.entries.is_empty() {
            return 0.0;
        }
        self.entries.iter().map(|e| e.fitness).sum::<f32>() / self.entries.len() as f32
    }

    pub fn best(&self) -> Option<&GalleryEntry> {
        self.entries
            .iter()
            .max_by(|a, b| a.fitness.total_cmp(&b.fitness))
    }

    /// Write the gallery as pretty-printed JSON.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), GalleryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let file = GalleryFile {
            version: GALLERY_VERSION,
            entries: self.entries.clone(),
        };
        fs::write(path, serde_json::to_string_pretty(&file)?)?;
        log::info!("Saved {} gallery entries to {}", self.entries.len(), path.display());
        Ok(())
    }

    /// Load a gallery written by [`FractalGallery::save_to_file`].
    ///
    /// Genomes are clamped into their gene bounds on load.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, GalleryError> {
        let content = fs::read_to_string(path)?;
        let file: GalleryFile = serde_json::from_str(&content)?;
        if file.version != GALLERY_VERSION {
            return Err(GalleryError::UnsupportedVersion(file.version));
        }

        let mut entries = file.entries;
        for entry in &mut entries {
            entry.genome.clamp_to_bounds();
        }
        Ok(Self { entries })
    }

    fn unique_name(&self, base: &str) -> String {
        let taken = |name: &str| self.entries.iter().any(|e| e.name == name);
        if !taken(base) {
            return base.to_string();
        }
        (1..)
            .map(|counter| format!("{base}_{counter}"))
            .find(|name| !taken(name))
            .unwrap_or_else(|| base.to_string())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::evolution::FitnessEvaluator;
    use crate::schema::{FitnessWeights, RenderSettings};

    fn genome(generation: u32) -> Genome {
        Genome {
            generation,
            ..Default::default()
        }
    }

    #[test]
    fn test_unique_names() {
        let mut gallery = FractalGallery::new();
        assert_eq!(gallery.add(&genome(0), 0.5, "", ""), "Fractal");
        assert_eq!(gallery.add(&genome(0), 0.6, "", ""), "Fractal_1");
        assert_eq!(gallery.add(&genome(0), 0.7, "Fractal", ""), "Fractal_2");
        assert_eq!(gallery.add(&genome(0), 0.7, "Spiral", "first"), "Spiral");
        assert_eq!(gallery.len(), 4);
        assert_eq!(gallery.find("Spiral").unwrap().description, "first");
    }

    #[test]
    fn test_remove_and_find() {
        let mut gallery = FractalGallery::new();
        let name = gallery.add(&genome(3), 0.4, "a", "");
        assert!(gallery.find(&name).is_some());
        assert!(gallery.remove(&name));
        assert!(!gallery.remove(&name));
        assert!(gallery.find(&name).is_none());
        assert!(gallery.is_empty());
    }

    #[test]
    fn test_queries() {
        let mut gallery = FractalGallery::new();
        gallery.add(&genome(1), 0.3, "a", "");
        gallery.add(&genome(5), 0.9, "b", "");
        gallery.add(&genome(9), 0.6, "c", "");
        gallery.add_tags("a", &["spiral", "dark"]);
        gallery.add_tags("c", &["spiral"]);
        gallery.add_tags("c", &["spiral"]);

        let top: Vec<_> = gallery.top(2).into_iter().map(|e| e.name.as_str()).collect();
        assert_eq!(top, vec!["b", "c"]);
        assert_eq!(gallery.best().unwrap().name, "b");
        assert!((gallery.average_fitness() - 0.6).abs() < 1e-6);

        assert_eq!(gallery.search_by_tags("spiral").len(), 2);
        assert_eq!(gallery.search_by_tags("dark, missing").len(), 1);
        assert!(gallery.search_by_tags("").is_empty());
        assert_eq!(gallery.find("c").unwrap().tags, vec!["spiral".to_string()]);

        let middle: Vec<_> = gallery.by_generation(2, 9).into_iter().map(|e| e.name.as_str()).collect();
        assert_eq!(middle, vec!["b", "c"]);
        assert!(!gallery.add_tags("missing", &["x"]));
    }

    #[test]
    fn test_empty_statistics() {
        let gallery = FractalGallery::new();
        assert_eq!(gallery.average_fitness(), 0.0);
        assert!(gallery.best().is_none());
        assert!(gallery.top(5).is_empty());
    }

    #[test]
    fn test_breakdown() {
        let evaluator = FitnessEvaluator::new(
            FitnessWeights::default(),
            RenderSettings {
                image_size: 8,
                max_iterations: 20,
                ..Default::default()
            },
        );
        let breakdown = evaluator.evaluate_detailed(&Genome::default()).unwrap();

        let mut gallery = FractalGallery::new();
        let name = gallery.add(&Genome::default(), breakdown.fitness, "", "");
        assert!(gallery.set_breakdown(&name, &breakdown));

        let entry = gallery.find(&name).unwrap();
        assert_eq!(entry.fitness_breakdown.len(), 6);
        assert!(entry.fitness_breakdown.contains_key("color_diversity"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("gallery.json");

        let mut gallery = FractalGallery::new();
        gallery.add(&genome(2), 0.8, "keep", "bright");
        gallery.add_tags("keep", &["favourite"]);
        gallery.add(&genome(4), 0.2, "", "");
        gallery.save_to_file(&path).unwrap();

        let loaded = FractalGallery::load_from_file(&path).unwrap();
        assert_eq!(loaded.all(), gallery.all());
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = FractalGallery::load_from_file(dir.path().join("missing.json"));
        assert!(matches!(missing, Err(GalleryError::Io(_))));

        let garbage = dir.path().join("garbage.json");
        fs::write(&garbage, "not json").unwrap();
        assert!(matches!(
            FractalGallery::load_from_file(&garbage),
            Err(GalleryError::Json(_))
        ));

        let future = dir.path().join("future.json");
        fs::write(&future, r#"{"version": 99, "entries": []}"#).unwrap();
        assert!(matches!(
            FractalGallery::load_from_file(&future),
            Err(GalleryError::UnsupportedVersion(99))
        ));
    }
}
