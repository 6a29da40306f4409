//! End-to-end slicing runs against stub renderer scripts.
//!
//! The stubs accept the real renderer argument order
//! (`-D<var>=<h> -o <out> <template>`) and write or refuse outputs as each
//! scenario needs.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::thread;
use std::time::Duration;

use lamina::{slice, SliceConfig, SliceError, SlicingOperation, Spacing};

fn stub_renderer(dir: &Path, body: &str) -> String {
    let path = dir.join("renderer.sh");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path.display().to_string()
}

fn base_config(dir: &Path, renderer: &str) -> SliceConfig {
    SliceConfig {
        object_modules: vec!["block()".into()],
        start: 0.0,
        end: 10.0,
        spacing: Spacing::Step(5.0),
        output_pattern: dir.join("out/slice_{height}.dxf").display().to_string(),
        renderer_command: renderer.into(),
        jobs: 2,
        ..Default::default()
    }
}

#[test]
fn test_slices_model_into_one_file_per_height() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = stub_renderer(dir.path(), r#"echo "section" > "$3""#);
    let config = base_config(dir.path(), &renderer);

    let op = SlicingOperation::new(config).unwrap();
    let template = op.template_path().to_path_buf();
    let summary = op.run().unwrap();

    assert_eq!(summary.total(), 3);
    assert!(summary.all_succeeded());
    for height in ["0", "5", "10"] {
        assert!(dir.path().join(format!("out/slice_{height}.dxf")).exists());
    }
    assert!(!template.exists(), "template should be removed after the run");
}

#[test]
fn test_count_spacing_reaches_both_endpoints() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = stub_renderer(dir.path(), r#"echo "section" > "$3""#);
    let config = SliceConfig {
        spacing: Spacing::Count(2),
        ..base_config(dir.path(), &renderer)
    };

    let summary = slice(config).unwrap();

    assert_eq!(summary.total(), 3);
    for height in ["0", "5", "10"] {
        assert!(dir.path().join(format!("out/slice_{height}.dxf")).exists());
    }
}

#[test]
fn test_renderer_receives_height_override_and_template() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("args.log");
    let body = format!("echo \"$1 $2 $4\" >> {}\necho ok > \"$3\"", log.display());
    let renderer = stub_renderer(dir.path(), &body);
    let config = SliceConfig {
        template_path: Some(dir.path().join("model_slice.scad")),
        ..base_config(dir.path(), &renderer)
    };

    slice(config).unwrap();

    let logged = fs::read_to_string(&log).unwrap();
    for height in ["0", "5", "10"] {
        assert!(logged.contains(&format!("-Dslice_z={height}")));
    }
    assert!(logged.contains("-o"));
    assert!(logged.contains("model_slice.scad"));
}

#[test]
fn test_keep_template_retains_composed_file() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = stub_renderer(dir.path(), r#"echo "section" > "$3""#);
    let template = dir.path().join("retained.scad");
    let config = SliceConfig {
        includes: vec!["gears.scad".into()],
        key_modules: vec!["keyway()".into()],
        template_path: Some(template.clone()),
        keep_template: true,
        ..base_config(dir.path(), &renderer)
    };

    slice(config).unwrap();

    let text = fs::read_to_string(&template).unwrap();
    assert!(text.contains("include <gears.scad>;"));
    assert!(text.contains("projection(cut = true)"));
    assert!(text.contains("block();"));
    assert!(text.contains("keyway();"));
}

#[test]
fn test_creates_nested_output_directories_and_reruns_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = stub_renderer(dir.path(), r#"echo "section" > "$3""#);
    let pattern = dir
        .path()
        .join("a/b/c/slice_{height}.dxf")
        .display()
        .to_string();
    let config = SliceConfig {
        output_pattern: pattern,
        ..base_config(dir.path(), &renderer)
    };

    slice(config.clone()).unwrap();
    // A second run into the existing tree overwrites in place.
    slice(config).unwrap();

    assert!(dir.path().join("a/b/c/slice_5.dxf").exists());
}

#[test]
fn test_render_failures_do_not_abort_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let body = r#"case "$1" in
*=5) echo "kernel meltdown" >&2; exit 2;;
esac
echo ok > "$3""#;
    let renderer = stub_renderer(dir.path(), body);
    let config = base_config(dir.path(), &renderer);

    let summary = slice(config).unwrap();

    assert_eq!(summary.total(), 3);
    assert_eq!(summary.succeeded(), 2);
    assert_eq!(summary.failed(), 1);
    let failure = summary.failures().next().unwrap();
    assert_eq!(failure.height, 5.0);
    assert_eq!(failure.outcome.diagnostic(), Some("kernel meltdown"));
    assert!(dir.path().join("out/slice_0.dxf").exists());
    assert!(dir.path().join("out/slice_10.dxf").exists());
}

#[test]
fn test_fail_on_error_surfaces_aggregate_failure_after_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = stub_renderer(dir.path(), r#"echo "no geometry" >&2; exit 1"#);
    let config = SliceConfig {
        fail_on_error: true,
        ..base_config(dir.path(), &renderer)
    };

    let op = SlicingOperation::new(config).unwrap();
    let template = op.template_path().to_path_buf();
    let err = op.run().unwrap_err();

    assert!(matches!(
        err,
        SliceError::SlicesFailed {
            failed: 3,
            total: 3
        }
    ));
    assert!(!template.exists(), "cleanup should run before the error");
}

#[test]
fn test_cancellation_leaves_pending_heights_unrendered() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = stub_renderer(dir.path(), "sleep 0.5\necho ok > \"$3\"");
    let config = SliceConfig {
        spacing: Spacing::Step(1.0),
        jobs: 1,
        ..base_config(dir.path(), &renderer)
    };

    let op = SlicingOperation::new(config).unwrap();
    let cancel = op.cancel_token();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(150));
        cancel.cancel();
    });

    let summary = op.run().unwrap();
    canceller.join().unwrap();

    assert_eq!(summary.total(), 11);
    assert!(summary.succeeded() >= 1);
    assert!(summary.cancelled() >= 1);
    assert_eq!(summary.failed(), 0);
}
