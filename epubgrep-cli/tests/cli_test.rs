use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const CONTAINER_XML: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

fn write_epub(path: &Path, entries: &[(&str, &str)]) -> Result<()> {
    let mut writer = ZipWriter::new(File::create(path)?);
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, content) in entries {
        writer.start_file(name.to_string(), stored)?;
        writer.write_all(content.as_bytes())?;
    }
    writer.finish()?;
    Ok(())
}

/// Two small books: a Doyle novel and a Stoker novel, both mentioning
/// "night" so metadata filters have something to discriminate.
fn write_library(dir: &Path) -> Result<()> {
    let scarlet_opf = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>A Study in Scarlet</dc:title>
    <dc:creator>Arthur Conan Doyle</dc:creator>
    <dc:date>1887</dc:date>
  </metadata>
</package>"#;
    write_epub(
        &dir.join("study_in_scarlet.epub"),
        &[
            ("mimetype", "application/epub+zip"),
            ("META-INF/container.xml", CONTAINER_XML),
            ("OEBPS/content.opf", scarlet_opf),
            (
                "OEBPS/chapter1.txt",
                "The lawn was dotted with visitors.\n\
                 Holmes examined the path carefully.\n\
                 Nothing more happened that night.\n",
            ),
        ],
    )?;

    let dracula_opf = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Dracula</dc:title>
    <dc:creator>Bram Stoker</dc:creator>
    <dc:date>1897</dc:date>
  </metadata>
</package>"#;
    write_epub(
        &dir.join("dracula.epub"),
        &[
            ("mimetype", "application/epub+zip"),
            ("META-INF/container.xml", CONTAINER_XML),
            ("OEBPS/content.opf", dracula_opf),
            (
                "OEBPS/chapter1.txt",
                "The castle gates were closed at night.\nWelcome to my house.\n",
            ),
        ],
    )?;
    Ok(())
}

fn search_json(args: &[&str], dir: &Path) -> Result<serde_json::Value> {
    let mut cmd = Command::cargo_bin("epubgrep")?;
    cmd.arg("search").arg("-d").arg(dir).args(args);
    let assert = cmd.assert().success();
    Ok(serde_json::from_slice(&assert.get_output().stdout)?)
}

#[test]
fn test_search_outputs_json_envelope() -> Result<()> {
    let dir = tempdir()?;
    write_library(dir.path())?;

    let report = search_json(&["-p", "Holmes"], dir.path())?;
    let results = report["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0]["path"]
        .as_str()
        .unwrap()
        .ends_with("study_in_scarlet.epub"));
    assert_eq!(
        results[0]["matches"][0]["fileName"],
        serde_json::json!("OEBPS/chapter1.txt")
    );
    // metadata extraction was off, so the key is absent entirely
    assert!(results[0].get("metadata").is_none());
    assert_eq!(report["summary"]["totalFiles"], serde_json::json!(1));
    assert_eq!(report["summary"]["totalMatches"], serde_json::json!(1));
    Ok(())
}

#[test]
fn test_pretty_output() -> Result<()> {
    let dir = tempdir()?;
    write_library(dir.path())?;

    let mut cmd = Command::cargo_bin("epubgrep")?;
    cmd.args(["search", "-p", "Holmes", "--pretty", "-d"])
        .arg(dir.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::starts_with("{\n"))
        .stdout(predicate::str::contains("\"results\""));
    Ok(())
}

#[test]
fn test_missing_directory_fails() -> Result<()> {
    let dir = tempdir()?;
    let mut cmd = Command::cargo_bin("epubgrep")?;
    cmd.args(["search", "-p", "Holmes", "-d"])
        .arg(dir.path().join("no-such-library"));
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("directory does not exist"));
    Ok(())
}

#[test]
fn test_filters_require_extract_metadata() -> Result<()> {
    let dir = tempdir()?;
    write_library(dir.path())?;

    let mut cmd = Command::cargo_bin("epubgrep")?;
    cmd.args(["search", "-p", "night", "--author", "Bram Stoker", "-d"])
        .arg(dir.path());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("require --extract-metadata"));
    Ok(())
}

#[test]
fn test_author_filter() -> Result<()> {
    let dir = tempdir()?;
    write_library(dir.path())?;

    let report = search_json(
        &["-p", "night", "--extract-metadata", "--author", "bram stoker"],
        dir.path(),
    )?;
    let results = report["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0]["path"].as_str().unwrap().ends_with("dracula.epub"));
    assert_eq!(
        results[0]["metadata"]["title"],
        serde_json::json!("Dracula")
    );
    assert_eq!(
        results[0]["metadata"]["yearReleased"],
        serde_json::json!(1897)
    );
    Ok(())
}

#[test]
fn test_regex_flag() -> Result<()> {
    let dir = tempdir()?;
    write_library(dir.path())?;

    let report = search_json(&["-p", r"(castle|lawn) gates", "--regex"], dir.path())?;
    assert_eq!(report["summary"]["totalMatches"], serde_json::json!(1));
    Ok(())
}

#[test]
fn test_ignore_case_flag() -> Result<()> {
    let dir = tempdir()?;
    write_library(dir.path())?;

    let report = search_json(&["-p", "HOLMES", "-i"], dir.path())?;
    assert_eq!(report["summary"]["totalMatches"], serde_json::json!(1));
    Ok(())
}

#[test]
fn test_context_flag() -> Result<()> {
    let dir = tempdir()?;
    write_library(dir.path())?;

    let report = search_json(&["-p", "examined", "-c", "1"], dir.path())?;
    let line = report["results"][0]["matches"][0]["line"].as_str().unwrap();
    assert!(line.contains("visitors.\nHolmes examined"));
    assert!(line.contains("carefully.\nNothing more"));
    Ok(())
}

#[test]
fn test_invalid_regex_fails() -> Result<()> {
    let dir = tempdir()?;
    write_library(dir.path())?;

    let mut cmd = Command::cargo_bin("epubgrep")?;
    cmd.args(["search", "--regex", "-p", "Hol(", "-d"]).arg(dir.path());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Invalid pattern"));
    Ok(())
}

#[test]
fn test_metadata_subcommand() -> Result<()> {
    let dir = tempdir()?;
    write_library(dir.path())?;

    let mut cmd = Command::cargo_bin("epubgrep")?;
    cmd.args(["metadata", "-d"]).arg(dir.path());
    let assert = cmd.assert().success();
    let report: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout)?;

    let results = report["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    // entries come back sorted by path
    assert!(results[0]["path"].as_str().unwrap().ends_with("dracula.epub"));
    assert_eq!(
        results[0]["metadata"]["title"],
        serde_json::json!("Dracula")
    );
    assert_eq!(
        results[1]["metadata"]["title"],
        serde_json::json!("A Study in Scarlet")
    );
    assert_eq!(report["summary"]["totalFiles"], serde_json::json!(2));
    Ok(())
}

#[test]
fn test_metadata_subcommand_missing_directory() -> Result<()> {
    let dir = tempdir()?;
    let mut cmd = Command::cargo_bin("epubgrep")?;
    cmd.args(["metadata", "-d"]).arg(dir.path().join("gone"));
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("directory does not exist"));
    Ok(())
}
