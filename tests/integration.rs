#[cfg(test)]
mod tests {
    use asset_squeeze::processors::BatchPlan;
    use asset_squeeze::{
        AspectRatio, AssetFormat, BatchConfig, BatchProcessor, CompressionMode, FailureKind,
        GeometryNormalizer, ImageProcessor, ImageToolError, ProcessConfig, ResizeAlgorithm,
        ResultStatus, SkipReason,
    };
    use assert_fs::prelude::*;
    use assert_fs::TempDir;
    use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
    use std::fs;
    use std::path::Path;

    /// Deterministic full-colour noise; PNG cannot shrink it and lossy codecs always can.
    fn noise_rgba(width: u32, height: u32, seed: u32) -> RgbaImage {
        let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
        RgbaImage::from_fn(width, height, |_, _| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let [r, g, b, _] = state.to_le_bytes();
            Rgba([r, g, b, 255])
        })
    }

    fn noise_rgb(width: u32, height: u32, seed: u32) -> RgbImage {
        let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
        RgbImage::from_fn(width, height, |_, _| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let [r, g, b, _] = state.to_le_bytes();
            Rgb([r, g, b])
        })
    }

    fn write_png(path: &Path, image: &RgbaImage) {
        image.save_with_format(path, ImageFormat::Png).unwrap();
    }

    fn size_of(path: &Path) -> u64 {
        fs::metadata(path).unwrap().len()
    }

    fn untouched_geometry() -> ProcessConfig {
        ProcessConfig {
            max_dimension: None,
            aspect_ratio: None,
            algorithm: ResizeAlgorithm::Bilinear,
            min_size_bytes: 0,
            ..ProcessConfig::default()
        }
    }

    fn batch_for(root: &Path) -> BatchConfig {
        BatchConfig {
            threads: 2,
            ..BatchConfig::new(root)
        }
    }

    /// 8x8 blocks over a smooth gradient, like flat-shaded card art. Compresses to a
    /// few hundred KB as PNG.
    fn blocky_art(width: u32, height: u32, seed: u32) -> RgbaImage {
        let blocks_x = width.div_ceil(8);
        let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
        let offsets: Vec<[u8; 3]> = (0..blocks_x * height.div_ceil(8))
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                let [r, g, b, _] = state.to_le_bytes();
                [r % 32, g % 32, b % 32]
            })
            .collect();
        RgbaImage::from_fn(width, height, |x, y| {
            let [dr, dg, db] = offsets[((y / 8) * blocks_x + x / 8) as usize];
            let base_r = (x * 200 / width) as u8;
            let base_g = (y * 200 / height) as u8;
            let base_b = ((x + y) * 100 / (width + height)) as u8;
            Rgba([base_r + dr, base_g + dg, base_b + db, 255])
        })
    }

    fn hero_scenario(delete_originals: bool) -> ProcessConfig {
        ProcessConfig {
            mode: CompressionMode::Webp,
            quality: 85,
            max_dimension: Some(1024),
            aspect_ratio: Some(AspectRatio::WIDESCREEN),
            algorithm: ResizeAlgorithm::Bilinear,
            delete_originals,
            ..ProcessConfig::default()
        }
    }

    #[test]
    fn test_opaque_2000px_png_becomes_widescreen_webp() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.child("hero.png");
        write_png(input.path(), &blocky_art(2000, 2000, 1));
        let original_size = size_of(input.path());
        assert!(original_size > 50 * 1024);

        let config = hero_scenario(false);
        let plan = GeometryNormalizer::new(config.algorithm, config.max_dimension, config.aspect_ratio)
            .plan(2000, 2000)
            .unwrap();
        assert_eq!(plan.resize_to, Some((1024, 1024).into()));
        let band = plan.crop.unwrap();
        assert_eq!((band.top, band.height), (224, 576));

        let result = ImageProcessor::new(config).process(input.path()).unwrap();

        assert_eq!(result.status, ResultStatus::Saved);
        assert_eq!(result.source_format, AssetFormat::Png);
        assert_eq!(result.output_format, AssetFormat::WebP);
        assert_eq!(result.output_path, temp_dir.path().join("hero.webp"));
        assert!(result.new_size < original_size);
        assert!(!result.original_deleted);
        assert_eq!(fs::read(input.path()).unwrap().len() as u64, original_size);

        let transform = result.transform.unwrap();
        assert!(transform.resized);
        assert!(transform.cropped);
        assert!(transform.alpha_dropped);
        assert_eq!((transform.before.width, transform.before.height), (2000, 2000));
        assert_eq!((transform.after.width, transform.after.height), (1024, 576));

        let written = image::open(&result.output_path).unwrap();
        assert_eq!((written.width(), written.height()), (1024, 576));
        assert!(!written.color().has_alpha());
        assert_eq!(size_of(&result.output_path), result.new_size);
    }

    #[test]
    fn test_opaque_2000px_png_batch_with_delete() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.child("hero.png");
        write_png(input.path(), &blocky_art(2000, 2000, 1));

        let report = BatchProcessor::new(hero_scenario(true), batch_for(temp_dir.path()))
            .unwrap()
            .with_confirmation(|plan: &BatchPlan| plan.destructive)
            .run()
            .unwrap();

        assert_eq!(report.saved_count(), 1);
        let result = &report.results[0];
        assert!(result.original_deleted);
        assert!(!input.path().exists());
        let written = image::open(temp_dir.child("hero.webp").path()).unwrap();
        assert_eq!((written.width(), written.height()), (1024, 576));
    }

    #[test]
    fn test_delete_originals_removes_transcoded_source() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.child("tile.png");
        write_png(input.path(), &noise_rgba(400, 300, 2));

        let config = ProcessConfig {
            mode: CompressionMode::Webp,
            delete_originals: true,
            ..untouched_geometry()
        };
        let result = ImageProcessor::new(config).process(input.path()).unwrap();

        assert_eq!(result.status, ResultStatus::Saved);
        assert!(result.original_deleted);
        assert!(!input.path().exists());
        assert!(temp_dir.child("tile.webp").path().exists());
    }

    #[test]
    fn test_small_files_are_left_byte_identical() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.child("icon.png");
        write_png(input.path(), &noise_rgba(16, 16, 3));
        let before = fs::read(input.path()).unwrap();

        let result = ImageProcessor::new(ProcessConfig::default())
            .process(input.path())
            .unwrap();

        assert_eq!(result.status, ResultStatus::Skipped(SkipReason::BelowThreshold));
        assert_eq!(result.bytes_saved, 0);
        assert_eq!(fs::read(input.path()).unwrap(), before);
    }

    #[test]
    fn test_png_second_pass_saves_nothing() {
        let temp_dir = TempDir::new().unwrap();
        write_png(temp_dir.child("a.png").path(), &noise_rgba(200, 150, 4));
        write_png(temp_dir.child("b.png").path(), &noise_rgba(120, 90, 5));

        let config = ProcessConfig {
            mode: CompressionMode::Png,
            ..untouched_geometry()
        };

        let first = BatchProcessor::new(config.clone(), batch_for(temp_dir.path()))
            .unwrap()
            .run()
            .unwrap();
        assert!(first.failures.is_empty());

        let second = BatchProcessor::new(config, batch_for(temp_dir.path()))
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(second.bytes_saved(), 0);
        assert_eq!(second.saved_count(), 0);
        assert_eq!(second.total_original_bytes, second.total_new_bytes);
    }

    #[test]
    fn test_saved_results_are_strictly_smaller_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        write_png(temp_dir.child("one.png").path(), &noise_rgba(300, 200, 6));
        noise_rgb(300, 200, 7)
            .save_with_format(temp_dir.child("two.jpg").path(), ImageFormat::Jpeg)
            .unwrap();

        let config = ProcessConfig {
            mode: CompressionMode::Webp,
            ..untouched_geometry()
        };
        let report = BatchProcessor::new(config, batch_for(temp_dir.path()))
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(report.results.len(), 2);
        for result in &report.results {
            if result.status == ResultStatus::Saved {
                assert!(result.new_size < result.original_size);
                assert_eq!(size_of(&result.output_path), result.new_size);
            } else {
                assert_eq!(result.new_size, result.original_size);
            }
        }
    }

    #[test]
    fn test_mislabeled_file_is_processed_by_content() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.child("actually_png.jpg");
        write_png(input.path(), &noise_rgba(200, 200, 8));

        let report = BatchProcessor::new(untouched_geometry(), batch_for(temp_dir.path()))
            .unwrap()
            .run()
            .unwrap();

        assert!(report.failures.is_empty());
        assert_eq!(report.results.len(), 1);
        let result = &report.results[0];
        assert!(result.extension_mismatch);
        assert_eq!(result.source_format, AssetFormat::Png);
        assert_eq!(result.output_path, input.path());

        let head = fs::read(input.path()).unwrap();
        assert_eq!(&head[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_bad_files_do_not_abort_the_batch() {
        let temp_dir = TempDir::new().unwrap();
        temp_dir
            .child("notes.png")
            .write_binary(b"this is plainly not an image at all")
            .unwrap();
        write_png(temp_dir.child("good.png").path(), &noise_rgba(64, 64, 9));

        let config = ProcessConfig {
            mode: CompressionMode::Webp,
            ..untouched_geometry()
        };
        let report = BatchProcessor::new(config, batch_for(temp_dir.path()))
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(report.candidates, 2);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].path.ends_with("notes.png"));
        assert!(!report.nothing_readable());
    }

    #[test]
    fn test_declined_run_touches_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.child("a.png");
        write_png(input.path(), &noise_rgba(100, 100, 10));
        let before = fs::read(input.path()).unwrap();

        let outcome = BatchProcessor::new(untouched_geometry(), batch_for(temp_dir.path()))
            .unwrap()
            .with_confirmation(|plan: &BatchPlan| {
                assert!(plan.destructive);
                false
            })
            .run();

        assert!(matches!(outcome, Err(ImageToolError::Declined)));
        assert_eq!(fs::read(input.path()).unwrap(), before);
        assert!(!temp_dir.child("backup_original").path().exists());
    }

    #[test]
    fn test_backup_copies_originals_once() {
        let temp_dir = TempDir::new().unwrap();
        temp_dir.child("sprites").create_dir_all().unwrap();
        let input = temp_dir.child("sprites/a.png");
        write_png(input.path(), &noise_rgba(100, 100, 11));
        let before = fs::read(input.path()).unwrap();

        let batch = BatchConfig {
            backup: true,
            ..batch_for(temp_dir.path())
        };
        let config = ProcessConfig {
            mode: CompressionMode::Png,
            ..untouched_geometry()
        };
        BatchProcessor::new(config, batch.clone()).unwrap().run().unwrap();

        let backup = temp_dir.child("backup_original/sprites/a.png");
        assert_eq!(fs::read(backup.path()).unwrap(), before);

        // The backup directory is never scanned as input.
        let plan = BatchProcessor::new(untouched_geometry(), batch)
            .unwrap()
            .plan()
            .unwrap();
        assert_eq!(plan.candidates.len(), 1);
    }

    #[test]
    fn test_output_dir_mirrors_layout() {
        let temp_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        temp_dir.child("levels/forest").create_dir_all().unwrap();
        let input = temp_dir.child("levels/forest/bg.png");
        write_png(input.path(), &noise_rgba(256, 256, 12));
        let before = fs::read(input.path()).unwrap();

        let batch = BatchConfig {
            output_dir: Some(out_dir.path().to_path_buf()),
            ..batch_for(temp_dir.path())
        };
        let config = ProcessConfig {
            mode: CompressionMode::Webp,
            ..untouched_geometry()
        };
        let report = BatchProcessor::new(config, batch).unwrap().run().unwrap();

        assert_eq!(report.saved_count(), 1);
        assert!(out_dir.child("levels/forest/bg.webp").path().exists());
        assert_eq!(fs::read(input.path()).unwrap(), before);
    }

    #[test]
    fn test_jpeg_mode_reencodes_progressively_in_place() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.child("photo.jpg");
        let mut encoded = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut encoded, 100)
            .encode_image(&noise_rgb(320, 240, 13))
            .unwrap();
        input.write_binary(&encoded).unwrap();

        let config = ProcessConfig {
            mode: CompressionMode::Jpeg,
            quality: 70,
            ..untouched_geometry()
        };
        let result = ImageProcessor::new(config).process(input.path()).unwrap();

        assert_eq!(result.status, ResultStatus::Saved);
        assert_eq!(result.output_path, input.path());
        let bytes = fs::read(input.path()).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        assert_eq!(bytes.len() as u64, result.new_size);
        assert!(result.new_size < encoded.len() as u64);
    }

    #[test]
    fn test_png_only_mode_skips_jpegs() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.child("photo.jpg");
        noise_rgb(64, 64, 14)
            .save_with_format(input.path(), ImageFormat::Jpeg)
            .unwrap();
        let before = fs::read(input.path()).unwrap();

        let config = ProcessConfig {
            mode: CompressionMode::Png,
            ..untouched_geometry()
        };
        let result = ImageProcessor::new(config).process(input.path()).unwrap();

        assert_eq!(result.status, ResultStatus::Skipped(SkipReason::NotApplicable));
        assert_eq!(fs::read(input.path()).unwrap(), before);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");

        let outcome = BatchProcessor::new(ProcessConfig::default(), batch_for(&missing))
            .unwrap()
            .run();

        assert!(matches!(outcome, Err(ImageToolError::UnreadableInput(_))));
    }

    #[test]
    fn test_empty_directory_is_a_quiet_success() {
        let temp_dir = TempDir::new().unwrap();
        temp_dir.child("readme.txt").write_str("no art here").unwrap();

        let report = BatchProcessor::new(ProcessConfig::default(), batch_for(temp_dir.path()))
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(report.candidates, 0);
        assert!(report.results.is_empty());
        assert!(!report.nothing_readable());
    }

    #[test]
    fn test_invalid_file() {
        let processor = ImageProcessor::new(untouched_geometry());

        let result = processor.process("nonexistent.png");

        assert!(matches!(result, Err(ImageToolError::UnreadableInput(_))));
    }

    #[test]
    fn test_same_stem_sources_never_share_an_output() {
        let temp_dir = TempDir::new().unwrap();
        let png = temp_dir.child("a.png");
        let jpg = temp_dir.child("a.jpg");
        write_png(png.path(), &noise_rgba(200, 150, 20));
        let mut encoded = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut encoded, 100)
            .encode_image(&noise_rgb(200, 150, 21))
            .unwrap();
        jpg.write_binary(&encoded).unwrap();
        let png_before = fs::read(png.path()).unwrap();

        let config = ProcessConfig {
            mode: CompressionMode::Webp,
            delete_originals: true,
            ..untouched_geometry()
        };
        let report = BatchProcessor::new(config, batch_for(temp_dir.path()))
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, png.path());
        assert_eq!(report.failures[0].kind, FailureKind::OutputConflict);
        assert_eq!(fs::read(png.path()).unwrap(), png_before);

        let converted = &report.results[0];
        assert_eq!(converted.path, jpg.path());
        assert_eq!(converted.output_path, temp_dir.path().join("a.webp"));
        assert!(temp_dir.child("a.webp").path().exists());
    }

    #[test]
    fn test_existing_unrelated_target_is_not_overwritten() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.child("logo.png");
        write_png(input.path(), &noise_rgba(200, 150, 22));
        let existing = temp_dir.child("logo.webp");
        existing.write_binary(b"hand-tuned export").unwrap();

        let config = ProcessConfig {
            mode: CompressionMode::Webp,
            delete_originals: true,
            ..untouched_geometry()
        };
        let result = ImageProcessor::new(config).process(input.path()).unwrap();

        assert_eq!(result.status, ResultStatus::Skipped(SkipReason::TargetExists));
        assert!(!result.original_deleted);
        assert!(input.path().exists());
        assert_eq!(fs::read(existing.path()).unwrap(), b"hand-tuned export");
    }

    #[test]
    fn test_in_place_webp_reencode_asks_first() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.child("banner.webp");
        noise_rgb(120, 90, 23)
            .save_with_format(input.path(), ImageFormat::WebP)
            .unwrap();
        let before = fs::read(input.path()).unwrap();

        let batch = BatchConfig {
            include: vec!["*.webp".to_string()],
            ..batch_for(temp_dir.path())
        };
        let config = ProcessConfig {
            mode: CompressionMode::Webp,
            ..untouched_geometry()
        };
        let outcome = BatchProcessor::new(config, batch)
            .unwrap()
            .with_confirmation(|plan: &BatchPlan| !plan.destructive)
            .run();

        assert!(matches!(outcome, Err(ImageToolError::Declined)));
        assert_eq!(fs::read(input.path()).unwrap(), before);
    }

    #[test]
    fn test_jpeg_second_and_third_pass_save_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.child("photo.jpg");
        let mut encoded = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut encoded, 100)
            .encode_image(&noise_rgb(320, 240, 24))
            .unwrap();
        input.write_binary(&encoded).unwrap();

        let processor = ImageProcessor::new(ProcessConfig {
            mode: CompressionMode::Jpeg,
            ..untouched_geometry()
        });

        let first = processor.process(input.path()).unwrap();
        assert_eq!(first.status, ResultStatus::Saved);
        let after_first = fs::read(input.path()).unwrap();

        for _ in 0..2 {
            let again = processor.process(input.path()).unwrap();
            assert_eq!(again.status, ResultStatus::AlreadyOptimal);
            assert_eq!(again.bytes_saved, 0);
            assert_eq!(fs::read(input.path()).unwrap(), after_first);
        }
    }

    #[test]
    fn test_quantized_png_second_pass_saves_nothing() {
        let Some(pngquant) = asset_squeeze::processors::quantizer::probe() else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.child("card.png");
        write_png(input.path(), &blocky_art(256, 144, 25));

        let processor = ImageProcessor::new(ProcessConfig {
            mode: CompressionMode::Png,
            quantizer: Some(pngquant),
            ..untouched_geometry()
        });

        processor.process(input.path()).unwrap();
        let after_first = fs::read(input.path()).unwrap();

        let second = processor.process(input.path()).unwrap();
        assert_eq!(second.bytes_saved, 0);
        assert_eq!(fs::read(input.path()).unwrap(), after_first);
    }

    #[cfg(unix)]
    #[test]
    fn test_rewrites_keep_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.child("scene.png");
        write_png(input.path(), &noise_rgba(400, 300, 26));
        fs::set_permissions(input.path(), fs::Permissions::from_mode(0o644)).unwrap();

        let cropped = ProcessConfig {
            mode: CompressionMode::Png,
            aspect_ratio: Some(AspectRatio::WIDESCREEN),
            ..untouched_geometry()
        };
        let result = ImageProcessor::new(cropped).process(input.path()).unwrap();
        assert_eq!(result.status, ResultStatus::Saved);
        let mode = fs::metadata(input.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);

        let transcoded = ProcessConfig {
            mode: CompressionMode::Webp,
            ..untouched_geometry()
        };
        let result = ImageProcessor::new(transcoded).process(input.path()).unwrap();
        assert_eq!(result.status, ResultStatus::Saved);
        let mode = fs::metadata(&result.output_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_delete_still_reports_the_write() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let input = temp_dir.child("locked.png");
        write_png(input.path(), &noise_rgba(200, 150, 27));
        fs::set_permissions(temp_dir.path(), fs::Permissions::from_mode(0o555)).unwrap();

        // Privileged users can delete regardless; nothing to observe then.
        let writable = fs::write(temp_dir.path().join("write-check"), b"").is_ok();
        if !writable {
            let config = ProcessConfig {
                mode: CompressionMode::Webp,
                delete_originals: true,
                ..untouched_geometry()
            };
            let result = ImageProcessor::new(config)
                .process_into(input.path(), temp_dir.path(), Some(out_dir.path()))
                .unwrap();

            assert_eq!(result.status, ResultStatus::Saved);
            assert!(!result.original_deleted);
            assert!(input.path().exists());
            assert!(out_dir.child("locked.webp").path().exists());
        }

        fs::set_permissions(temp_dir.path(), fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_small_mislabeled_file_is_flagged() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.child("tiny.jpg");
        write_png(input.path(), &noise_rgba(8, 8, 28));

        let result = ImageProcessor::new(ProcessConfig::default())
            .process(input.path())
            .unwrap();

        assert_eq!(result.status, ResultStatus::Skipped(SkipReason::BelowThreshold));
        assert_eq!(result.source_format, AssetFormat::Png);
        assert!(result.extension_mismatch);
    }
}
