// settings.rs
use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchSettings {
    /// Hardware cap on instances per instanced draw call.
    #[serde(default = "BatchSettings::default_max_instancing_count")]
    pub max_instancing_count: usize,
    /// Initial capacity of every per-group job array.
    #[serde(default = "BatchSettings::default_initial_job_capacity")]
    pub initial_job_capacity: usize,
    #[serde(default = "BatchSettings::default_occlusion_culling")]
    pub occlusion_culling: bool,
    /// Dispatch opaque batches in a stable order (mask, material, mesh)
    /// instead of hash order. Meant for golden-image comparisons.
    #[serde(default)]
    pub deterministic_order: bool,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_instancing_count: Self::default_max_instancing_count(),
            initial_job_capacity: Self::default_initial_job_capacity(),
            occlusion_culling: Self::default_occlusion_culling(),
            deterministic_order: false,
        }
    }
}

impl BatchSettings {
    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|err| {
                warn!(
                    "Failed to parse {:?} ({}). Falling back to default batch settings.",
                    path, err
                );
                Self::default()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Batch settings file {:?} not found. Using default settings.",
                    path
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default batch settings.",
                    path, err
                );
                Self::default()
            }
        }
    }

    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<BatchSettings>(contents).map(Self::validate)
    }

    pub fn validate(mut self) -> Self {
        if self.max_instancing_count == 0 {
            warn!("Instancing limit must be greater than zero. Using default value.");
            self.max_instancing_count = Self::default_max_instancing_count();
        }

        if self.initial_job_capacity == 0 {
            warn!("Initial job capacity must be greater than zero. Using default value.");
            self.initial_job_capacity = Self::default_initial_job_capacity();
        }

        self
    }

    const fn default_max_instancing_count() -> usize {
        512
    }

    const fn default_initial_job_capacity() -> usize {
        256
    }

    const fn default_occlusion_culling() -> bool {
        true
    }
}
