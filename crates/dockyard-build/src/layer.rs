//! ビルドレイヤー
//!
//! ステージの出力を tar.gz アーカイブとして保持します。

use crate::error::{BuildError, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};

/// 1ステージ分の出力レイヤー（不変）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    /// このレイヤーを生成したステージのキャッシュキー
    pub key: String,
    /// tar.gz 形式の内容
    pub archive: Vec<u8>,
}

impl Layer {
    pub fn new(key: impl Into<String>, archive: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            archive,
        }
    }

    /// 作業ディレクトリ内の宣言済み出力からレイヤーを作成
    ///
    /// `outputs` が空の場合は作業ディレクトリ全体を取り込む。
    pub fn capture(key: impl Into<String>, root: &Path, outputs: &[PathBuf]) -> Result<Self> {
        let mut archive = Vec::new();
        {
            let encoder = GzEncoder::new(&mut archive, Compression::default());
            let mut tar = Builder::new(encoder);
            tar.follow_symlinks(false);

            if outputs.is_empty() {
                tar.append_dir_all(".", root)?;
            }
            for output in outputs {
                let source = root.join(output);
                if !source.exists() {
                    return Err(BuildError::OutputMissing(output.clone()));
                }
                if source.is_dir() {
                    tar.append_dir_all(output, &source)?;
                } else {
                    tar.append_path_with_name(&source, output)?;
                }
            }

            tar.into_inner()?.finish()?;
        }

        tracing::debug!(bytes = archive.len(), outputs = outputs.len(), "Captured layer");
        Ok(Self::new(key, archive))
    }

    /// レイヤーの内容をディレクトリに展開
    pub fn unpack_into(&self, dir: &Path) -> Result<()> {
        let decoder = GzDecoder::new(self.archive.as_slice());
        let mut archive = Archive::new(decoder);
        archive.set_preserve_permissions(true);
        archive.unpack(dir)?;
        Ok(())
    }

    /// レイヤー内のファイルを読み出す
    pub fn read_file(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        let decoder = GzDecoder::new(self.archive.as_slice());
        let mut archive = Archive::new(decoder);
        for entry in archive.entries()? {
            let mut entry = entry?;
            let entry_path = entry.path()?.into_owned();
            if normalized(&entry_path) == normalized(path) && entry.header().entry_type().is_file()
            {
                let mut contents = Vec::new();
                entry.read_to_end(&mut contents)?;
                return Ok(Some(contents));
            }
        }
        Ok(None)
    }

    pub fn size(&self) -> usize {
        self.archive.len()
    }
}

fn normalized(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, std::path::Component::CurDir))
        .collect()
}
