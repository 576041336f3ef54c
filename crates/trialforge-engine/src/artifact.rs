//! Generated model artifacts written next to a running trial.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use rand::Rng;

use crate::compiler::parse_graph_script;
use crate::error::RunnerError;
use crate::graph::ModelGraph;

const NAME_PREFIX: &str = "_generated_model_";
const NAME_SUFFIX_LEN: usize = 6;
const NAME_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CREATE_ATTEMPTS: usize = 16;

/// Model script materialized under a unique file name.
///
/// The file is removed when the value is dropped, whatever the outcome of the
/// trial that used it.
#[derive(Debug)]
pub struct GeneratedModule {
    path: PathBuf,
}

impl GeneratedModule {
    /// Write `script` into a fresh file in `dir`.
    ///
    /// Names are random and the file is created exclusively, so concurrent trials
    /// sharing `dir` never overwrite each other.
    pub fn materialize(dir: &Path, script: &str) -> Result<Self, RunnerError> {
        let mut rng = rand::thread_rng();
        let mut last_err = None;
        for _ in 0..CREATE_ATTEMPTS {
            let path = dir.join(format!("{NAME_PREFIX}{}.json", random_suffix(&mut rng)));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let module = Self { path };
                    file.write_all(script.as_bytes())
                        .and_then(|()| file.flush())
                        .map_err(|source| RunnerError::ArtifactIo {
                            path: module.path.clone(),
                            source,
                        })?;
                    return Ok(module);
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    last_err = Some((path, err));
                }
                Err(source) => return Err(RunnerError::ArtifactIo { path, source }),
            }
        }

        let (path, source) = last_err.unwrap_or_else(|| {
            (
                dir.to_path_buf(),
                io::Error::new(io::ErrorKind::AlreadyExists, "no free artifact name"),
            )
        });
        Err(RunnerError::ArtifactIo { path, source })
    }

    /// Location of the artifact.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Module name, i.e. the file stem.
    pub fn module_name(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
    }

    /// Read the artifact back and resolve the model graph it defines.
    pub fn load(&self) -> Result<ModelGraph, RunnerError> {
        let script = std::fs::read_to_string(&self.path).map_err(|source| {
            RunnerError::ArtifactIo {
                path: self.path.clone(),
                source,
            }
        })?;
        parse_graph_script(&script).map_err(|reason| RunnerError::ModelLoad {
            path: self.path.clone(),
            reason,
        })
    }
}

impl Drop for GeneratedModule {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                log::warn!("remove {}: {err}", self.path.display());
            }
        }
    }
}

fn random_suffix(rng: &mut impl Rng) -> String {
    (0..NAME_SUFFIX_LEN)
        .map(|_| char::from(NAME_CHARSET[rng.gen_range(0..NAME_CHARSET.len())]))
        .collect()
}
