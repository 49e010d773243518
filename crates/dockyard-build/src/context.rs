use crate::error::{BuildError, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use tar::Builder;

pub struct ContextBuilder;

impl ContextBuilder {
    /// ランタイムイメージ用のビルドコンテキストを tar.gz として作成
    ///
    /// 含まれるのは Dockerfile と成果物1つだけで、ソースツリーやビルドツールは入らない。
    pub fn runtime_context(
        dockerfile: &str,
        artifact_name: &str,
        artifact: &[u8],
    ) -> Result<Vec<u8>> {
        let mut archive_data = Vec::new();
        {
            let encoder = GzEncoder::new(&mut archive_data, Compression::default());
            let mut tar = Builder::new(encoder);

            Self::append_file(&mut tar, "Dockerfile", dockerfile.as_bytes(), 0o644)?;
            Self::append_file(&mut tar, artifact_name, artifact, 0o755)?;

            tar.into_inner()?.finish()?;
        }

        tracing::debug!("Build context created: {} bytes", archive_data.len());
        Self::check_context_size(archive_data.len());

        Ok(archive_data)
    }

    fn append_file<W: std::io::Write>(
        tar: &mut Builder<W>,
        path: &str,
        contents: &[u8],
        mode: u32,
    ) -> Result<()> {
        let mut header = tar::Header::new_gnu();
        header
            .set_path(path)
            .map_err(|e| BuildError::InvalidConfig(format!("Failed to set {} path: {}", path, e)))?;
        header.set_size(contents.len() as u64);
        header.set_mode(mode);
        header.set_cksum();
        tar.append(&header, contents)?;
        Ok(())
    }

    /// コンテキストサイズのチェックと警告
    fn check_context_size(size: usize) {
        const MAX_CONTEXT_SIZE: usize = 500 * 1024 * 1024; // 500MB

        if size > MAX_CONTEXT_SIZE {
            tracing::warn!(
                "警告: ランタイムコンテキストが大きすぎます（{}MB）\n\
                 成果物に不要なファイルが含まれていないか確認してください。",
                size / 1024 / 1024
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_runtime_context_contains_only_dockerfile_and_artifact() {
        let archive =
            ContextBuilder::runtime_context("FROM debian:bookworm-slim\n", "inventory-api", b"bin")
                .unwrap();

        let decoder = flate2::read::GzDecoder::new(archive.as_slice());
        let mut tar = tar::Archive::new(decoder);
        let mut entries = Vec::new();
        for entry in tar.entries().unwrap() {
            let mut entry = entry.unwrap();
            let path = entry.path().unwrap().to_string_lossy().to_string();
            let mode = entry.header().mode().unwrap();
            let mut contents = String::new();
            entry.read_to_string(&mut contents).unwrap();
            entries.push((path, mode, contents));
        }

        assert_eq!(
            entries,
            vec![
                (
                    "Dockerfile".to_string(),
                    0o644,
                    "FROM debian:bookworm-slim\n".to_string()
                ),
                ("inventory-api".to_string(), 0o755, "bin".to_string()),
            ]
        );
    }
}
