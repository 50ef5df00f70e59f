use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use super::Tool;
use super::design::strip_code_fence;
use crate::files::{self, Artifacts};

/// Saves HTML posts as `post_<timestamp>.html` under a directory.
pub struct PostWriterTool {
    output_dir: PathBuf,
    artifacts: Artifacts,
}

impl PostWriterTool {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            artifacts: Artifacts::new(),
        }
    }

    pub fn with_artifacts(mut self, artifacts: Artifacts) -> Self {
        self.artifacts = artifacts;
        self
    }
}

#[async_trait]
impl Tool for PostWriterTool {
    fn name(&self) -> &str {
        "Post Writer"
    }

    fn description(&self) -> &str {
        "Cria posts HTML para WordPress e salva na pasta de saída."
    }

    #[instrument(name = "tool.post_writer", skip_all, fields(dir = %self.output_dir.display()))]
    async fn run(&self, content: &str) -> String {
        let path = files::timestamped_path(&self.output_dir, "post", "html");
        match files::save_text(strip_code_fence(content), &path) {
            Ok(()) => {
                info!(path = %path.display(), "post saved");
                self.artifacts.record(&path);
                format!("Post HTML salvo com sucesso em: {}", path.display())
            }
            Err(err) => {
                warn!(error = %err, "unable to save post");
                format!("Erro ao salvar post: {err}")
            }
        }
    }
}

/// Saves the working text to a fixed path, suffixing it when taken.
pub struct TextSaverTool {
    path: PathBuf,
    artifacts: Artifacts,
}

impl TextSaverTool {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            artifacts: Artifacts::new(),
        }
    }

    pub fn with_artifacts(mut self, artifacts: Artifacts) -> Self {
        self.artifacts = artifacts;
        self
    }
}

#[async_trait]
impl Tool for TextSaverTool {
    fn name(&self) -> &str {
        "Text Saver"
    }

    fn description(&self) -> &str {
        "Salva o conteúdo produzido em arquivo."
    }

    #[instrument(name = "tool.text_saver", skip_all)]
    async fn run(&self, content: &str) -> String {
        let path = files::unique_path(self.path.clone());
        match files::save_text(strip_code_fence(content), &path) {
            Ok(()) => {
                info!(path = %path.display(), bytes = content.len(), "text saved");
                self.artifacts.record(&path);
                format!("Conteúdo salvo em: {}", path.display())
            }
            Err(err) => {
                warn!(error = %err, "unable to save text");
                format!("Erro ao salvar conteúdo: {err}")
            }
        }
    }
}
