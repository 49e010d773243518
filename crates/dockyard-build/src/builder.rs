use crate::assembler::AssembledImage;
use crate::error::{BuildError, Result};
use bollard::Docker;
use colored::Colorize;
use futures_util::stream::StreamExt;

pub struct ImageBuilder {
    docker: Docker,
}

impl ImageBuilder {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// 組み立て済みイメージをビルドし、全てのタグを付与
    ///
    /// ビルドが失敗した場合はタグ付けを行わない。
    pub async fn build_and_tag(&self, assembled: &AssembledImage) -> Result<()> {
        let image = &assembled.image;
        self.build_image(assembled.context.clone(), &image.reference)
            .await?;

        for alias in image.tags.iter().filter(|t| **t != image.reference) {
            self.tag_image(&image.reference, alias).await?;
        }
        Ok(())
    }

    /// イメージをビルド
    pub async fn build_image(&self, context_data: Vec<u8>, tag: &str) -> Result<()> {
        tracing::info!("Building image: {}", tag);

        #[allow(deprecated)]
        let options = bollard::image::BuildImageOptions {
            dockerfile: "Dockerfile",
            t: tag,
            rm: true,      // 中間コンテナを削除
            forcerm: true, // ビルド失敗時も中間コンテナを削除
            pull: true,    // ベースイメージを常にpull
            ..Default::default()
        };

        use bytes::Bytes;
        use http_body_util::{Either, Full};
        let body = Full::new(Bytes::from(context_data));
        let mut stream = self
            .docker
            .build_image(options, None, Some(Either::Left(body)));

        while let Some(msg) = stream.next().await {
            match msg {
                Ok(output) => {
                    self.handle_build_output(output)?;
                }
                Err(e) => {
                    return Err(BuildError::DockerConnection(e));
                }
            }
        }

        tracing::info!("Successfully built: {}", tag);
        Ok(())
    }

    /// `source` に別名タグを付与
    pub async fn tag_image(&self, source: &str, target: &str) -> Result<()> {
        let (repo, tag) = split_reference(target);

        #[allow(deprecated)]
        let options = bollard::image::TagImageOptions { repo, tag };

        self.docker.tag_image(source, Some(options)).await?;
        tracing::info!(source = %source, target = %target, "Tagged image");
        Ok(())
    }

    /// ビルド出力の処理
    fn handle_build_output(&self, output: bollard::models::BuildInfo) -> Result<()> {
        if let Some(stream) = output.stream {
            print!("{}", stream.dimmed());
        }

        if let Some(error) = output.error {
            return Err(BuildError::ImageBuildFailed(error));
        }

        if let Some(error_detail) = output.error_detail {
            let error_msg = error_detail
                .message
                .unwrap_or_else(|| "Unknown build error".to_string());
            return Err(BuildError::ImageBuildFailed(error_msg));
        }

        if let Some(status) = output.status {
            println!("{}", status.cyan());
        }

        Ok(())
    }

    /// イメージの存在確認
    pub async fn image_exists(&self, image_tag: &str) -> Result<bool> {
        match self.docker.inspect_image(image_tag).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(BuildError::DockerConnection(e)),
        }
    }
}

/// `repo:tag` を分割（レジストリのポート指定を考慮）
///
/// 例: "localhost:5000/app:1.0" -> ("localhost:5000/app", "1.0")
pub fn split_reference(reference: &str) -> (&str, &str) {
    match reference.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo, tag),
        _ => (reference, "latest"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_reference() {
        assert_eq!(split_reference("inventory-api:1.4.0"), ("inventory-api", "1.4.0"));
        assert_eq!(split_reference("inventory-api"), ("inventory-api", "latest"));
        assert_eq!(
            split_reference("localhost:5000/inventory-api:latest"),
            ("localhost:5000/inventory-api", "latest")
        );
        assert_eq!(
            split_reference("localhost:5000/inventory-api"),
            ("localhost:5000/inventory-api", "latest")
        );
    }

    #[tokio::test]
    #[ignore] // Docker接続が必要なため、通常のテストではスキップ
    async fn test_build_and_tag_runtime_image() {
        use crate::context::ContextBuilder;

        let docker = Docker::connect_with_local_defaults().unwrap();
        let builder = ImageBuilder::new(docker);

        let context = ContextBuilder::runtime_context(
            "FROM alpine:latest\nCOPY app /app/app\nCMD [\"/app/app\"]\n",
            "app",
            b"#!/bin/sh\necho ok\n",
        )
        .unwrap();

        builder
            .build_image(context, "dockyard-test:1.0")
            .await
            .unwrap();
        builder
            .tag_image("dockyard-test:1.0", "dockyard-test:latest")
            .await
            .unwrap();
        assert!(builder.image_exists("dockyard-test:latest").await.unwrap());

        for tag in ["dockyard-test:1.0", "dockyard-test:latest"] {
            builder
                .docker
                .remove_image(
                    tag,
                    None::<bollard::query_parameters::RemoveImageOptions>,
                    None,
                )
                .await
                .ok();
        }
    }
}
