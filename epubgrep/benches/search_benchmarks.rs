#![allow(unused_must_use)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use epubgrep::{
    CancelToken, FileSearch, MetadataExtractor, PatternCache, SearchConfig, SearchQuery,
    SearchRequest,
};
use std::fs::File;
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::Path;
use tempfile::tempdir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const CONTAINER_XML: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

fn chapter_body(book: usize, chapter: usize, lines: usize) -> String {
    let mut body = String::from("<html><body>");
    for line in 0..lines {
        body.push_str(&format!(
            "<p>Paragraph {line} of chapter {chapter} in book {book}: the detective \
             Holmes weighed the evidence against observation {line}.</p>"
        ));
    }
    body.push_str("</body></html>");
    body
}

fn create_library(root: &Path, book_count: usize, chapters_per_book: usize) -> std::io::Result<()> {
    for book in 0..book_count {
        let path = root.join(format!("book_{book}.epub"));
        let mut writer = ZipWriter::new(File::create(path)?);
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        writer.start_file("mimetype".to_string(), stored)?;
        writer.write_all(b"application/epub+zip")?;
        writer.start_file("META-INF/container.xml".to_string(), stored)?;
        writer.write_all(CONTAINER_XML.as_bytes())?;
        writer.start_file("OEBPS/content.opf".to_string(), stored)?;
        writer.write_all(
            format!(
                r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Casebook {book}</dc:title>
    <dc:creator>Arthur Conan Doyle</dc:creator>
    <dc:date>1892</dc:date>
    <meta name="calibre:series" content="Sherlock Holmes"/>
    <meta name="calibre:series_index" content="{book}.0"/>
  </metadata>
</package>"#
            )
            .as_bytes(),
        )?;
        for chapter in 0..chapters_per_book {
            writer.start_file(format!("OEBPS/chapter_{chapter}.xhtml"), stored)?;
            writer.write_all(chapter_body(book, chapter, 40).as_bytes())?;
        }
        writer.finish()?;
    }
    Ok(())
}

fn run_search(root: &Path, extract_metadata: bool, request: &SearchRequest) -> usize {
    let mut config = SearchConfig::new(root);
    config.thread_count = NonZeroUsize::new(2).unwrap();
    config.extract_metadata = extract_metadata;

    let mut total = 0usize;
    FileSearch::new(config)
        .search(&CancelToken::new(), request, |result| {
            total += result.matches.len();
            Ok(())
        })
        .unwrap();
    total
}

fn request_for(query: SearchQuery, context: usize) -> SearchRequest {
    SearchRequest {
        query,
        filters: None,
        context,
    }
}

fn bench_pattern_shapes(c: &mut Criterion) -> std::io::Result<()> {
    let dir = tempdir()?;
    create_library(dir.path(), 8, 4)?;

    let queries = [
        ("literal", SearchQuery::text("Holmes", false)),
        ("literal_ignore_case", SearchQuery::text("holmes", true)),
        ("alternation", SearchQuery::regex("Holmes|Watson|Lestrade")),
        ("bounded_repeat", SearchQuery::regex(r"observation \d{1,3}")),
    ];

    let mut group = c.benchmark_group("Pattern Shapes");
    for (name, query) in queries {
        let request = request_for(query, 0);
        group.bench_function(name, |b| {
            b.iter(|| black_box(run_search(dir.path(), false, &request)));
        });
    }
    group.finish();
    Ok(())
}

fn bench_library_scaling(c: &mut Criterion) -> std::io::Result<()> {
    let request = request_for(SearchQuery::text("Holmes", false), 0);

    let mut group = c.benchmark_group("Library Scaling");
    for count in [1, 10, 50] {
        let dir = tempdir()?;
        create_library(dir.path(), count, 4)?;

        group.bench_function(format!("archives_{count}"), |b| {
            b.iter(|| black_box(run_search(dir.path(), false, &request)));
        });
    }
    group.finish();
    Ok(())
}

fn bench_context_windows(c: &mut Criterion) -> std::io::Result<()> {
    let dir = tempdir()?;
    create_library(dir.path(), 8, 4)?;

    let mut group = c.benchmark_group("Context Windows");
    for context in [0, 2, 16] {
        let request = request_for(SearchQuery::text("evidence", false), context);
        group.bench_function(format!("context_{context}"), |b| {
            b.iter(|| black_box(run_search(dir.path(), false, &request)));
        });
    }
    group.finish();
    Ok(())
}

fn bench_metadata(c: &mut Criterion) -> std::io::Result<()> {
    let dir = tempdir()?;
    create_library(dir.path(), 10, 4)?;
    let single = dir.path().join("book_0.epub");

    let mut group = c.benchmark_group("Metadata");

    let extractor = MetadataExtractor::new(NonZeroUsize::new(2).unwrap());
    group.bench_function("process_file", |b| {
        b.iter(|| {
            black_box(
                extractor
                    .process_file(&CancelToken::new(), &single)
                    .unwrap(),
            );
        });
    });

    let request = request_for(SearchQuery::text("Holmes", false), 0);
    group.bench_function("search_with_extraction", |b| {
        b.iter(|| black_box(run_search(dir.path(), true, &request)));
    });

    group.finish();
    Ok(())
}

fn bench_pattern_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("Pattern Cache");

    let cache = PatternCache::new(16);
    cache.get(r"observation \d{1,3}").unwrap();
    group.bench_function("cached_lookup", |b| {
        b.iter(|| black_box(cache.get(r"observation \d{1,3}").unwrap()));
    });

    group.bench_function("fresh_compile", |b| {
        b.iter(|| {
            let cache = PatternCache::new(16);
            black_box(cache.get(r"observation \d{1,3}").unwrap());
        });
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default();
    targets = bench_pattern_shapes, bench_library_scaling,
              bench_context_windows, bench_metadata, bench_pattern_cache
}

#[test]
fn ensure_benchmarks_valid() {
    benches();
}

criterion_main!(benches);
