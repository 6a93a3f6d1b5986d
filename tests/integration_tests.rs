//! Integration tests for bpc-utils
//!
//! These drive the public API the way a converter does: discover files,
//! dispatch one conversion per file and collect ordered results.

use bpc_utils::parallel::{Capabilities, DispatchOptions, Dispatcher};
use bpc_utils::{
    Linesep, TextSource, detect_files, detect_indentation, detect_linesep, dispatch,
};
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::TempDir;

/// Test the dispatch examples give the same answer serially and in parallel
#[test]
fn test_dispatch_uppercase_examples() {
    for jobs in [Some(1), Some(3), None] {
        let results = dispatch(["a", "b", "c"], |s, _ctx| Ok(s.to_uppercase()), jobs, false)
            .expect("dispatch should not crash");
        let values: Vec<_> = results.into_iter().map(|r| r.into_result().unwrap()).collect();
        assert_eq!(values, ["A", "B", "C"], "jobs = {jobs:?}");
    }
}

/// Test a failing task is reported without disturbing its neighbours
#[test]
fn test_dispatch_reports_failures_in_order() {
    let reported = Mutex::new(Vec::new());
    let options = DispatchOptions::new(Capabilities::with_cpus(4)).jobs(Some(2));
    let results = Dispatcher::new(options)
        .with_reporter(|failure| reported.lock().unwrap().push(failure.index))
        .dispatch(["ok", "bad", "ok", "bad"], |s, _ctx| {
            if s == "bad" {
                anyhow::bail!("cannot convert {s:?}");
            }
            Ok(s.len())
        })
        .expect("dispatch should not crash");

    assert_eq!(results.len(), 4);
    assert_eq!(results[0].value(), Some(&2));
    assert!(results[1].is_failure());
    assert_eq!(results[2].value(), Some(&2));
    let failure = results[3].failure_info().unwrap();
    assert!(failure.message.contains("cannot convert"));
    assert_eq!(*reported.lock().unwrap(), vec![1, 3]);
}

/// Test discovering a source tree and converting every file in parallel
#[test]
fn test_convert_discovered_tree() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let root = temp.path().canonicalize()?;
    fs::create_dir_all(root.join("pkg/sub"))?;
    fs::write(root.join("pkg/a.py"), "if x:\n    y = 1\n")?;
    fs::write(root.join("pkg/sub/b.py"), "if x:\r\n\ty = 1\r\n")?;
    fs::write(root.join("pkg/sub/c.txt"), "not python\n")?;

    let files = detect_files(&[root.join("pkg").display().to_string()])?;
    assert_eq!(files, vec![root.join("pkg/a.py"), root.join("pkg/sub/b.py")]);

    let log = Mutex::new(Vec::new());
    let results = dispatch(
        files,
        |path: PathBuf, ctx| {
            let mut file = File::open(&path)?;
            file.seek(SeekFrom::Start(3))?;
            let linesep = detect_linesep(&mut file)?;
            let indent = detect_indentation(&mut file)?;
            anyhow::ensure!(file.stream_position()? == 3, "stream cursor moved");
            ctx.lock().with_lock(|| log.lock().unwrap().push(ctx.index()));
            Ok((linesep, indent))
        },
        Some(2),
        true,
    )?;

    let converted: Vec<_> = results.into_iter().map(|r| r.into_result().unwrap()).collect();
    assert_eq!(
        converted,
        vec![
            (Linesep::Lf, "    ".to_string()),
            (Linesep::CrLf, "\t".to_string()),
        ]
    );
    let mut seen = log.into_inner().unwrap();
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1]);
    Ok(())
}

/// Test a text source over a file restores the cursor after output is written
#[test]
fn test_text_source_over_file() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("module.py");
    fs::write(&path, "print('hi')\n")?;

    let mut file = File::open(&path)?;
    file.seek(SeekFrom::Start(5))?;
    let output = {
        let mut source = TextSource::open(&mut file)?;
        let mut text = String::new();
        source.read_to_string(&mut text)?;
        assert_eq!(text, "print('hi')\n");
        source.write(&text.replace("hi", "bye"));
        source.close()?
    };
    assert_eq!(output, "print('bye')\n");
    assert_eq!(file.stream_position()?, 5);
    Ok(())
}
