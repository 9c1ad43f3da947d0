//! Save pipeline: copy a document into the caller-owned output collection

use crate::error::{Error, ResolverError, Result};
use crate::media::NamingGenerator;
use crate::resolver::{ByteReader, ByteWriter, ContentResolver};
use crate::types::{AppSettings, DocumentUri, NewEntry, OutputDescriptor, SaveRequest};
use chrono::NaiveDateTime;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

const COPY_BUFFER_SIZE: usize = 8192;

pub struct SavePipeline {
    resolver: Arc<dyn ContentResolver>,
    naming: NamingGenerator,
    output_relative_path: String,
    max_name_attempts: u32,
}

impl SavePipeline {
    pub fn new(resolver: Arc<dyn ContentResolver>) -> Self {
        Self::from_settings(resolver, &AppSettings::default())
    }

    pub fn from_settings(resolver: Arc<dyn ContentResolver>, settings: &AppSettings) -> Self {
        Self {
            resolver,
            naming: NamingGenerator::new(settings.name_prefix.clone()),
            output_relative_path: settings.output_relative_path.clone(),
            max_name_attempts: settings.max_name_attempts.max(1),
        }
    }

    /// Copy `request.source` into the output collection under a generated name
    pub async fn save(&self, request: &SaveRequest) -> Result<OutputDescriptor> {
        self.save_at(request, chrono::Local::now().naive_local()).await
    }

    /// [`save`](Self::save) with an explicit timestamp for the generated name
    pub async fn save_at(
        &self,
        request: &SaveRequest,
        now: NaiveDateTime,
    ) -> Result<OutputDescriptor> {
        let base_name = self
            .naming
            .generate(&request.original_name, &request.mime_type, now);

        let (destination, generated_name) =
            self.create_entry(&base_name, &request.mime_type).await?;

        match self.copy(&request.source, &destination).await {
            Ok((bytes_written, sha256)) => {
                info!(
                    "Saved {} as {} ({} bytes)",
                    request.source, generated_name, bytes_written
                );
                Ok(OutputDescriptor {
                    destination,
                    generated_name,
                    bytes_written,
                    sha256,
                })
            }
            Err(e) => {
                // Never leave a partial entry behind
                if let Err(cleanup) = self.resolver.delete(&destination).await {
                    warn!(
                        "Failed to remove partial entry {}: {}",
                        destination, cleanup
                    );
                }
                Err(e)
            }
        }
    }

    /// Insert an empty entry, disambiguating the name while it is taken
    async fn create_entry(
        &self,
        base_name: &str,
        mime_type: &str,
    ) -> Result<(DocumentUri, String)> {
        for attempt in 0..self.max_name_attempts {
            let name = NamingGenerator::disambiguate(base_name, attempt);
            let entry = NewEntry {
                display_name: name.clone(),
                mime_type: mime_type.to_string(),
                relative_path: self.output_relative_path.clone(),
            };

            match self.resolver.insert(&entry).await {
                Ok(Some(uri)) => {
                    debug!("Created output entry {}", uri);
                    return Ok((uri, name));
                }
                Ok(None) => return Err(Error::Save("Failed to create file".to_string())),
                Err(ResolverError::AlreadyExists(_)) => {
                    debug!("Output name {} is taken", name);
                }
                Err(e) => return Err(Error::Save(e.to_string())),
            }
        }

        Err(Error::Save(format!(
            "No free name for {} after {} attempts",
            base_name, self.max_name_attempts
        )))
    }

    async fn copy(
        &self,
        source: &DocumentUri,
        destination: &DocumentUri,
    ) -> Result<(u64, String)> {
        let input = self
            .resolver
            .open_input(source)
            .await
            .map_err(|e| Error::Save(e.to_string()))?
            .ok_or_else(|| Error::Save(format!("Cannot open input stream for {}", source)))?;

        let output = self
            .resolver
            .open_output(destination)
            .await
            .map_err(|e| Error::Save(e.to_string()))?
            .ok_or_else(|| {
                Error::Save(format!("Cannot open output stream for {}", destination))
            })?;

        copy_stream(input, output)
            .await
            .map_err(|e| Error::Save(e.to_string()))
    }
}

/// Copy `input` to `output` in fixed-size chunks, returning the byte count and SHA-256
async fn copy_stream(
    mut input: ByteReader,
    mut output: ByteWriter,
) -> std::io::Result<(u64, String)> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let bytes_read = input.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
        output.write_all(&buffer[..bytes_read]).await?;
        total += bytes_read as u64;
    }

    output.flush().await?;
    output.shutdown().await?;

    Ok((total, hex::encode(hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ContentReader;
    use crate::resolver::{LocalResolver, MockContentResolver};
    use crate::types::{AccessMode, TreeUri};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    async fn volume_with(
        name: &str,
        content: &[u8],
    ) -> (tempfile::TempDir, Arc<LocalResolver>, DocumentUri) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Statuses")).unwrap();
        std::fs::write(dir.path().join("Statuses").join(name), content).unwrap();

        let resolver = Arc::new(
            LocalResolver::new(dir.path())
                .with_media_collection("Pictures/Saved")
                .unwrap(),
        );
        let tree = TreeUri::primary("Statuses");
        resolver
            .take_persistable_permission(&tree, AccessMode::Read)
            .await
            .unwrap();

        let source = tree.document(format!("primary:Statuses/{}", name));
        (dir, resolver, source)
    }

    struct Unreadable;

    impl AsyncRead for Unreadable {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "bad sector")))
        }
    }

    struct Sink;

    impl AsyncWrite for Sink {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_save_round_trip() {
        let content: Vec<u8> = (0..50_000u32).map(|i| (i % 253) as u8).collect();
        let (dir, resolver, source) = volume_with("clip.mp4", &content).await;

        let pipeline = SavePipeline::new(resolver.clone());
        let request = SaveRequest::new(source.clone(), "video/mp4", "clip.mp4");
        let output = pipeline.save_at(&request, at(3, 4, 5)).await.unwrap();

        assert_eq!(output.generated_name, "whatsapp_status_20240102_030405.mp4");
        assert_eq!(output.bytes_written, content.len() as u64);
        assert_eq!(output.sha256, hex::encode(Sha256::digest(&content)));
        assert!(dir
            .path()
            .join("Download/WhatsBuddy/whatsapp_status_20240102_030405.mp4")
            .exists());

        let reader = ContentReader::new(resolver);
        let copied = reader.read_bytes(&output.destination).await.unwrap();
        let original = reader.read_bytes(&source).await.unwrap();
        assert_eq!(copied, original);
    }

    #[tokio::test]
    async fn test_same_second_saves_get_distinct_names() {
        let (dir, resolver, source) = volume_with("a.jpeg", b"jpeg").await;
        std::fs::create_dir_all(dir.path().join("Download/WhatsBuddy")).unwrap();
        std::fs::write(
            dir.path()
                .join("Download/WhatsBuddy/whatsapp_status_20240102_030405.jpeg"),
            b"keep me",
        )
        .unwrap();

        let pipeline = SavePipeline::new(resolver);
        let request = SaveRequest::new(source, "image/jpeg", "a.jpeg");

        let first = pipeline.save_at(&request, at(3, 4, 5)).await.unwrap();
        let second = pipeline.save_at(&request, at(3, 4, 5)).await.unwrap();

        assert_eq!(first.generated_name, "whatsapp_status_20240102_030405_1.jpeg");
        assert_eq!(second.generated_name, "whatsapp_status_20240102_030405_2.jpeg");
        assert_ne!(first.destination, second.destination);

        // The pre-existing entry was not overwritten
        let existing = std::fs::read(
            dir.path()
                .join("Download/WhatsBuddy/whatsapp_status_20240102_030405.jpeg"),
        )
        .unwrap();
        assert_eq!(existing, b"keep me");
    }

    #[tokio::test]
    async fn test_name_attempts_are_bounded() {
        let mut resolver = MockContentResolver::new();
        resolver
            .expect_insert()
            .times(3)
            .returning(|entry| Err(ResolverError::AlreadyExists(entry.display_name.clone())));

        let settings = AppSettings {
            max_name_attempts: 3,
            ..AppSettings::default()
        };
        let pipeline = SavePipeline::from_settings(Arc::new(resolver), &settings);
        let request = SaveRequest::new(DocumentUri::media("primary:x.jpg"), "image/jpeg", "x.jpg");

        let err = pipeline.save_at(&request, at(1, 1, 1)).await.unwrap_err();
        assert!(matches!(err, Error::Save(_)));
    }

    #[tokio::test]
    async fn test_custom_prefix_and_folder() {
        let (dir, resolver, source) = volume_with("p.png", b"png").await;
        let settings = AppSettings {
            output_relative_path: "Pictures/Saved".into(),
            name_prefix: "saved_".into(),
            ..AppSettings::default()
        };

        let output = SavePipeline::from_settings(resolver, &settings)
            .save_at(&SaveRequest::new(source, "image/png", "p.png"), at(1, 2, 3))
            .await
            .unwrap();

        assert_eq!(output.generated_name, "saved_20240102_010203.png");
        assert!(dir.path().join("Pictures/Saved/saved_20240102_010203.png").exists());
    }

    #[tokio::test]
    async fn test_output_outside_media_collections_is_rejected() {
        let (dir, resolver, source) = volume_with("p.png", b"png").await;
        let settings = AppSettings {
            output_relative_path: "Statuses".into(),
            ..AppSettings::default()
        };

        let err = SavePipeline::from_settings(resolver, &settings)
            .save_at(&SaveRequest::new(source, "image/png", "p.png"), at(1, 2, 3))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Save(_)));
        let names: Vec<_> = std::fs::read_dir(dir.path().join("Statuses"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("p.png")]);
    }

    #[tokio::test]
    async fn test_missing_source_leaves_no_entry() {
        let (dir, resolver, source) = volume_with("a.jpg", b"x").await;
        std::fs::remove_file(dir.path().join("Statuses/a.jpg")).unwrap();

        let err = SavePipeline::new(resolver)
            .save_at(&SaveRequest::new(source, "image/jpeg", "a.jpg"), at(1, 1, 1))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Save(_)));
        let leftovers = std::fs::read_dir(dir.path().join("Download/WhatsBuddy"))
            .unwrap()
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_failed_copy_deletes_destination() {
        let destination = DocumentUri::media("primary:Download/WhatsBuddy/out.jpg");

        let mut resolver = MockContentResolver::new();
        let created = destination.clone();
        resolver
            .expect_insert()
            .times(1)
            .returning(move |_| Ok(Some(created.clone())));
        resolver.expect_open_input().returning(|_| {
            let stream: ByteReader = Box::new(Unreadable);
            Ok(Some(stream))
        });
        resolver.expect_open_output().returning(|_| {
            let stream: ByteWriter = Box::new(Sink);
            Ok(Some(stream))
        });
        let expected = destination.clone();
        resolver
            .expect_delete()
            .withf(move |uri| *uri == expected)
            .times(1)
            .returning(|_| Ok(()));

        let err = SavePipeline::new(Arc::new(resolver))
            .save_at(
                &SaveRequest::new(DocumentUri::media("primary:in.jpg"), "image/jpeg", "in.jpg"),
                at(1, 1, 1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Save(_)));
    }

    #[tokio::test]
    async fn test_cleanup_failure_keeps_original_error() {
        let mut resolver = MockContentResolver::new();
        resolver
            .expect_insert()
            .returning(|_| Ok(Some(DocumentUri::media("primary:Download/WhatsBuddy/out.jpg"))));
        resolver.expect_open_input().returning(|_| Ok(None));
        resolver
            .expect_delete()
            .times(1)
            .returning(|_| Err(ResolverError::PermissionDenied("read-only".into())));

        let err = SavePipeline::new(Arc::new(resolver))
            .save_at(
                &SaveRequest::new(DocumentUri::media("primary:in.jpg"), "image/jpeg", "in.jpg"),
                at(1, 1, 1),
            )
            .await
            .unwrap_err();

        match err {
            Error::Save(message) => assert!(message.contains("input stream")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_insert_returning_nothing_is_save_error() {
        let mut resolver = MockContentResolver::new();
        resolver.expect_insert().returning(|_| Ok(None));

        let err = SavePipeline::new(Arc::new(resolver))
            .save_at(
                &SaveRequest::new(DocumentUri::media("primary:in.jpg"), "image/jpeg", "in.jpg"),
                at(1, 1, 1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Save(m) if m == "Failed to create file"));
    }
}
