use bigzip::config::{ArchiveConfig, ErrorPolicy, Granularity};
use bigzip::entry::{IndexLine, OFFSET_WIDTH, SIGNATURE, SIGNATURE_LEN};
use bigzip::hash;
use bigzip::recovery::scanner::RecoveryQuality;
use bigzip::{Archive, ArchiveError, ContentHash};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn fresh(config: ArchiveConfig) -> (TempDir, Archive) {
    let dir = tempfile::tempdir().unwrap();
    let ar = Archive::open_with(dir.path().join("t.big"), config).unwrap();
    (dir, ar)
}

fn write_file(root: &Path, rel: &str, data: &[u8]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, data).unwrap();
}

fn index_text(ar: &Archive) -> Vec<String> {
    fs::read_to_string(&ar.paths().index)
        .unwrap()
        .lines()
        .map(str::to_owned)
        .collect()
}

fn log_text(ar: &Archive) -> Vec<String> {
    fs::read_to_string(&ar.paths().log)
        .unwrap()
        .lines()
        .map(str::to_owned)
        .collect()
}

#[test]
fn test_open_creates_triple_with_headers() {
    let (_dir, ar) = fresh(ArchiveConfig::default());
    assert_eq!(ar.size().unwrap(), 0);

    let index = index_text(&ar);
    let log = log_text(&ar);
    assert_eq!(index.len(), 1);
    assert_eq!(log.len(), 1);
    assert!(index[0].starts_with("BIG81nb-index | "));
    assert!(index[0].contains(" | Copyright (C) "));
    assert!(index[0].ends_with(" bigzip"));
    assert!(log[0].starts_with("BIG81nb-log | "));
}

#[test]
fn test_concrete_scenario_single_text_file() {
    let (dir, mut ar) = fresh(ArchiveConfig::default());
    let src = dir.path().join("src");
    write_file(&src, "a.txt", b"hello");

    let report = ar.append_folder(&src).unwrap();
    assert_eq!(report.stored.len(), 1);
    assert!(report.skipped.is_empty());

    let data = fs::read(&ar.paths().data).unwrap();
    assert_eq!(&data[..SIGNATURE.len()], SIGNATURE);

    let index = index_text(&ar);
    assert_eq!(index.len(), 2);
    assert_eq!(index[1], "000000000000000 aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d /a.txt");

    let log = log_text(&ar);
    assert_eq!(log.len(), 3);
    assert!(log[1].starts_with("start: 000000000000000 "));
    assert!(log[1].ends_with("->src"));
    assert!(log[2].starts_with(&format!("ended: {:015} ", data.len())));

    assert_eq!(ar.extract_text("/a.txt").unwrap().as_deref(), Some("hello"));
}

#[test]
fn test_folder_roundtrip_nested() {
    let (dir, mut ar) = fresh(ArchiveConfig::default());
    let src = dir.path().join("photos");
    let binary: Vec<u8> = (0..20_000u32).map(|i| (i * 31 % 251) as u8).collect();
    write_file(&src, "readme.txt", b"top level");
    write_file(&src, "sub/b.bin", &binary);
    write_file(&src, "sub/deeper/c.txt", b"deep");
    write_file(&src, "empty.dat", b"");

    ar.append_folder(&src).unwrap();

    assert_eq!(ar.extract_bytes("/readme.txt").unwrap().unwrap(), b"top level");
    assert_eq!(ar.extract_bytes("/sub/b.bin").unwrap().unwrap(), binary);
    assert_eq!(ar.extract_bytes("/sub/deeper/c.txt").unwrap().unwrap(), b"deep");
    assert_eq!(ar.extract_bytes("/empty.dat").unwrap().unwrap(), b"");

    // Suffix lookup at a '/' boundary.
    assert_eq!(ar.extract_bytes("b.bin").unwrap().unwrap(), binary);
    assert!(ar.extract_bytes("in").unwrap().is_none());
    assert!(ar.extract("/missing.txt").unwrap().is_none());
}

#[test]
fn test_extracted_metadata() {
    let (dir, mut ar) = fresh(ArchiveConfig::default());
    let src = dir.path().join("src");
    write_file(&src, "notes/todo.md", b"- item");
    ar.append_folder(&src).unwrap();

    let extracted = ar.extract("/notes/todo.md").unwrap().unwrap();
    assert_eq!(extracted.name, "todo.md");
    assert_eq!(extracted.path.as_deref(), Some("/notes/todo.md"));
    assert_eq!(extracted.hash, Some(hash::digest(b"- item")));
    assert!(extracted.modified > 0);
    assert_eq!(extracted.offset, 0);
}

#[test]
fn test_offsets_monotonic_and_fixed_width() {
    let (dir, mut ar) = fresh(ArchiveConfig::default());
    let src = dir.path().join("src");
    write_file(&src, "1.txt", b"one");
    write_file(&src, "2.txt", b"two two");
    write_file(&src, "3.txt", b"three three three");
    write_file(&src, "dir/4.txt", b"four");
    ar.append_folder(&src).unwrap();
    ar.append_bytes(b"five", "/extra/5.txt").unwrap();

    let lines = index_text(&ar);
    let mut previous: Option<u64> = None;
    for line in &lines[1..] {
        let offset: u64 = line[..OFFSET_WIDTH].parse().unwrap();
        assert_eq!(&line[OFFSET_WIDTH..OFFSET_WIDTH + 1], " ");
        let hash = &line[OFFSET_WIDTH + 1..OFFSET_WIDTH + 41];
        assert!(hash.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_eq!(&line[OFFSET_WIDTH + 41..OFFSET_WIDTH + 42], " ");
        if let Some(p) = previous {
            assert!(offset > p, "{offset} should follow {p}");
        }
        previous = Some(offset);
    }
    assert_eq!(lines.len(), 6);
}

#[test]
fn test_entry_spans_tile_data_file() {
    let (dir, mut ar) = fresh(ArchiveConfig::default());
    let src = dir.path().join("src");
    write_file(&src, "a", b"aaaa");
    write_file(&src, "b", b"bbbbbbbb");
    write_file(&src, "c", b"c");
    let report = ar.append_folder(&src).unwrap();

    let mut cursor = 0;
    for entry in &report.stored {
        assert_eq!(entry.offset, cursor);
        cursor = entry.end();
    }
    assert_eq!(cursor, ar.size().unwrap());
    assert_eq!(report.position, cursor);
    assert_eq!(report.stored_bytes(), cursor);
    assert_eq!(report.stored[1].offset, report.stored[0].offset + SIGNATURE_LEN + report.stored[0].compressed_length);
}

#[test]
fn test_search_by_hash() {
    let (dir, mut ar) = fresh(ArchiveConfig::default());
    let src = dir.path().join("src");
    write_file(&src, "a.txt", b"same");
    write_file(&src, "b.txt", b"different");
    write_file(&src, "c/copy.txt", b"same");
    ar.append_folder(&src).unwrap();

    let same = hash::digest(b"same");
    assert_eq!(ar.find_by_hash(&same).unwrap().as_deref(), Some("/a.txt"));
    assert_eq!(ar.find_all_by_hash(&same).unwrap(), vec!["/a.txt", "/c/copy.txt"]);
    assert_eq!(ar.find_by_hash(&hash::digest(b"different")).unwrap().as_deref(), Some("/b.txt"));

    let absent: ContentHash = "0000000000000000000000000000000000000000".parse().unwrap();
    assert!(ar.find_by_hash(&absent).unwrap().is_none());
    assert!(ar.find_all_by_hash(&absent).unwrap().is_empty());
}

#[test]
fn test_sequential_completeness() {
    let (dir, mut ar) = fresh(ArchiveConfig::default());
    let src = dir.path().join("src");
    let files: Vec<(String, Vec<u8>)> = (0..12)
        .map(|i| (format!("f{i:02}.bin"), vec![i as u8; 100 * (i + 1)]))
        .collect();
    for (name, data) in &files {
        write_file(&src, name.as_str(), data.as_slice());
    }
    ar.append_folder(&src).unwrap();

    let mut entries = ar.entries().unwrap();
    let mut seen = Vec::new();
    let mut total = 0usize;
    for extracted in entries.by_ref() {
        let extracted = extracted.unwrap();
        total += extracted.data.len();
        seen.push(extracted.path.unwrap());
    }

    let expected: Vec<String> = files.iter().map(|(n, _)| format!("/{n}")).collect();
    assert_eq!(seen, expected);
    assert_eq!(total, files.iter().map(|(_, d)| d.len()).sum::<usize>());
    assert_eq!(entries.files_read(), 12);
    assert_eq!(entries.position(), ar.size().unwrap());
    assert!(entries.last_line().unwrap().ends_with(" /f11.bin"));
    assert!(entries.next().is_none());
}

#[test]
fn test_empty_archive_iteration_ends_cleanly() {
    let (_dir, ar) = fresh(ArchiveConfig::default());
    let mut entries = ar.entries().unwrap();
    assert!(entries.next().is_none());
    assert_eq!(entries.files_read(), 0);
    assert!(ar.list().unwrap().is_empty());
}

#[test]
fn test_resume_point_and_skip() {
    let (_dir, ar) = fresh(ArchiveConfig::default());
    for i in 0..5 {
        ar.append_bytes(format!("payload {i}").as_bytes(), &format!("/p/{i}.txt")).unwrap();
    }

    let mut entries = ar.entries().unwrap();
    let first: Vec<_> = entries.by_ref().take(2).map(|e| e.unwrap().path.unwrap()).collect();
    assert_eq!(first, vec!["/p/0.txt", "/p/1.txt"]);
    let point = entries.resume_point();
    assert_eq!(point.files_read, 2);
    drop(entries);

    let mut resumed = ar.entries_from(point).unwrap();
    let rest: Vec<_> = resumed.by_ref().map(|e| e.unwrap().text().into_owned()).collect();
    assert_eq!(rest, vec!["payload 2", "payload 3", "payload 4"]);
    assert_eq!(resumed.files_read(), 5);

    let mut skipping = ar.entries().unwrap();
    assert_eq!(skipping.skip_entries(3).unwrap(), 3);
    assert_eq!(skipping.files_read(), 3);
    let next = skipping.next().unwrap().unwrap();
    assert_eq!(next.path.as_deref(), Some("/p/3.txt"));
    assert_eq!(skipping.skip_entries(10).unwrap(), 1);
    assert!(skipping.next().is_none());
}

#[test]
fn test_size_limit_skips_without_abort() {
    let config = ArchiveConfig::default().with_max_file_size(64);
    let (dir, mut ar) = fresh(config);
    let src = dir.path().join("src");
    write_file(&src, "big.bin", &[7u8; 1000]);
    write_file(&src, "small.txt", b"fits");

    let report = ar.append_folder(&src).unwrap();
    assert_eq!(report.stored.len(), 1);
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].path.ends_with("big.bin"));

    let paths: Vec<String> = ar.list().unwrap().into_iter().map(|l| l.path).collect();
    assert_eq!(paths, vec!["/small.txt"]);
    assert!(ar.extract("/big.bin").unwrap().is_none());
}

#[test]
fn test_abort_policy_rolls_back_open_session() {
    let config = ArchiveConfig::default()
        .with_max_file_size(64)
        .with_error_policy(ErrorPolicy::Abort);
    let (dir, mut ar) = fresh(config);
    let src = dir.path().join("src");
    write_file(&src, "a_small.txt", b"fits");
    write_file(&src, "b_big.bin", &[1u8; 1000]);

    let err = ar.append_folder(&src).unwrap_err();
    assert!(matches!(err, ArchiveError::TooLarge { .. }));
    assert!(err.is_source_error());

    assert_eq!(ar.size().unwrap(), 0);
    assert!(ar.list().unwrap().is_empty());
    assert_eq!(log_text(&ar).len(), 1);
}

#[test]
fn test_per_file_granularity_commits_each_file() {
    let config = ArchiveConfig::default().with_granularity(Granularity::PerFile);
    let (dir, mut ar) = fresh(config);
    let src = dir.path().join("src");
    write_file(&src, "a", b"1");
    write_file(&src, "b", b"2");
    write_file(&src, "c", b"3");

    let report = ar.append_folder(&src).unwrap();
    assert_eq!(report.sessions, 3);

    let log = log_text(&ar);
    assert_eq!(log.len(), 1 + 3 * 2);
    let starts: Vec<_> = log.iter().filter(|l| l.starts_with("start: ")).collect();
    assert_eq!(starts.len(), 3);
    assert!(starts[0].ends_with("->/a"));
    for (index, entry) in report.stored.iter().enumerate() {
        assert!(starts[index].starts_with(&format!("start: {:015} ", entry.offset)));
    }
}

#[test]
fn test_subtree_granularity_single_session() {
    let (dir, mut ar) = fresh(ArchiveConfig::default());
    let src = dir.path().join("src");
    write_file(&src, "a", b"1");
    write_file(&src, "b", b"2");
    write_file(&src, "c", b"3");

    let report = ar.append_folder(&src).unwrap();
    assert_eq!(report.sessions, 1);
    assert_eq!(log_text(&ar).len(), 3);
}

#[test]
fn test_max_depth_bounds_walk() {
    let mut config = ArchiveConfig::default();
    config.max_depth = 1;
    let (dir, mut ar) = fresh(config);
    let src = dir.path().join("src");
    write_file(&src, "top.txt", b"t");
    write_file(&src, "sub/nested.txt", b"n");

    let report = ar.append_folder(&src).unwrap();
    let paths: Vec<_> = report.stored.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["/top.txt"]);
}

#[test]
fn test_base_path_established_by_first_folder() {
    let (dir, mut ar) = fresh(ArchiveConfig::default());
    let first = dir.path().join("first");
    let second = first.join("later");
    write_file(&first, "x.txt", b"x");
    ar.append_folder(&first).unwrap();

    write_file(&second, "y.txt", b"y");
    ar.append_folder(&second).unwrap();

    assert_eq!(ar.base_path().unwrap(), fs::canonicalize(&first).unwrap());
    assert!(ar.extract("/later/y.txt").unwrap().is_some());
}

#[test]
fn test_set_base_path_and_append_file() {
    let (dir, mut ar) = fresh(ArchiveConfig::default());
    let root = dir.path().join("root");
    write_file(&root, "docs/guide.txt", b"guide");
    ar.set_base_path(&root);

    let entry = ar.append_file(root.join("docs/guide.txt"), None).unwrap();
    assert_eq!(entry.path, "/docs/guide.txt");
    assert_eq!(entry.hash, hash::digest(b"guide"));
    assert_eq!(entry.hash, hash::digest_file(&root.join("docs/guide.txt")).unwrap());

    let hinted = ar.append_file(root.join("docs/guide.txt"), Some(root.join("docs").as_path())).unwrap();
    assert_eq!(hinted.path, "/guide.txt");
    assert!(hinted.offset > entry.offset);
}

#[test]
fn test_append_file_missing_source_is_error() {
    let (dir, ar) = fresh(ArchiveConfig::default());
    let err = ar.append_file(dir.path().join("nope.txt"), None).unwrap_err();
    assert!(matches!(err, ArchiveError::SourceFile { .. }));
    assert_eq!(ar.size().unwrap(), 0);
}

#[test]
fn test_append_bytes_and_extract_at_offset() {
    let (_dir, ar) = fresh(ArchiveConfig::default());
    let first = ar.append_bytes(b"first buffer", "/mem/first.txt").unwrap();
    let second = ar.append_bytes(b"second buffer", "/mem/second.txt").unwrap();

    let raw = ar.extract_at(second.offset).unwrap();
    assert_eq!(raw.data, b"second buffer");
    assert_eq!(raw.name, "second.txt");
    assert!(raw.path.is_none());

    assert_eq!(ar.extract_at(first.offset).unwrap().data, b"first buffer");
    assert!(matches!(
        ar.extract_at(first.offset + 1),
        Err(ArchiveError::MissingSignature { .. })
    ));
}

#[test]
fn test_append_bytes_rejects_multiline_path() {
    let (_dir, ar) = fresh(ArchiveConfig::default());
    let err = ar.append_bytes(b"x", "/bad\nname").unwrap_err();
    assert!(matches!(err, ArchiveError::InvalidPath(_)));
    assert!(ar.list().unwrap().is_empty());
}

#[test]
fn test_extract_to_file_replaces_target() {
    let (dir, ar) = fresh(ArchiveConfig::default());
    ar.append_bytes(b"new contents", "/out.txt").unwrap();

    let target = dir.path().join("exported/out.txt");
    fs::create_dir_all(target.parent().unwrap()).unwrap();
    fs::write(&target, b"old contents that are longer").unwrap();

    assert!(ar.extract_to_file("/out.txt", &target).unwrap());
    assert_eq!(fs::read(&target).unwrap(), b"new contents");
    assert!(!ar.extract_to_file("/nothing.txt", dir.path().join("x")).unwrap());
}

#[test]
fn test_unpack_recreates_tree() {
    let (dir, mut ar) = fresh(ArchiveConfig::default());
    let src = dir.path().join("src");
    write_file(&src, "a.txt", b"a");
    write_file(&src, "deep/b.txt", b"b");
    ar.append_folder(&src).unwrap();
    ar.append_bytes(b"escape", "/../../escape.txt").unwrap();

    let out = dir.path().join("out");
    assert_eq!(ar.unpack(&out).unwrap(), 3);
    assert_eq!(fs::read(out.join("a.txt")).unwrap(), b"a");
    assert_eq!(fs::read(out.join("deep/b.txt")).unwrap(), b"b");
    assert_eq!(fs::read(out.join("escape.txt")).unwrap(), b"escape");
}

#[test]
fn test_codecs_roundtrip_through_archive() {
    use bigzip::CodecId;
    for codec in [CodecId::None, CodecId::Zstd, CodecId::Lz4, CodecId::Brotli, CodecId::Lzma] {
        let (_dir, ar) = fresh(ArchiveConfig::default().with_codec(codec, 3));
        let data = format!("{} codec payload ", codec.name()).repeat(50);
        ar.append_bytes(data.as_bytes(), "/c.txt").unwrap();
        assert_eq!(ar.extract_text("/c.txt").unwrap().unwrap(), data);
    }
}

#[test]
fn test_scan_without_index() {
    let (_dir, ar) = fresh(ArchiveConfig::default());
    ar.append_bytes(b"one", "/1").unwrap();
    ar.append_bytes(b"two", "/2").unwrap();
    ar.append_bytes(b"three", "/3").unwrap();

    let report = ar.scan().unwrap();
    assert_eq!(report.total_scanned, 3);
    assert_eq!(report.healthy_entries, 3);
    assert_eq!(report.quality, RecoveryQuality::Full);
    assert_eq!(report.recoverable_bytes, 3 + 3 + 5);
    let names: Vec<_> = report.entries.iter().map(|e| e.header.as_ref().unwrap().name.clone()).collect();
    assert_eq!(names, vec!["1", "2", "3"]);
}

#[test]
fn test_list_matches_index_lines() {
    let (_dir, ar) = fresh(ArchiveConfig::default());
    let a = ar.append_bytes(b"a", "/a").unwrap();
    let b = ar.append_bytes(b"b", "/b").unwrap();

    let listed = ar.list().unwrap();
    assert_eq!(listed, vec![
        IndexLine { offset: a.offset, hash: a.hash, path: a.path.clone() },
        IndexLine { offset: b.offset, hash: b.hash, path: b.path.clone() },
    ]);
    let located = ar.locate("/b").unwrap().unwrap();
    assert_eq!(located.start, b.offset);
    assert_eq!(located.end, ar.size().unwrap());
    assert_eq!(located.compressed_length(), b.compressed_length);
}

#[test]
fn test_reopen_sees_previous_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.big");
    {
        let ar = Archive::open(&path).unwrap();
        ar.append_bytes(b"persisted", "/keep.txt").unwrap();
        ar.close().unwrap();
    }
    let ar = Archive::open(&path).unwrap();
    assert_eq!(ar.extract_text("/keep.txt").unwrap().as_deref(), Some("persisted"));
    // Headers are written once.
    assert_eq!(index_text(&ar).iter().filter(|l| l.starts_with("BIG81nb")).count(), 1);
}

#[test]
fn test_config_from_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bigzip.json");
    fs::write(&path, r#"{ "owner": "archivist", "codec": "lz4", "granularity": "per_file", "max_file_size": 10 }"#).unwrap();

    let config = ArchiveConfig::from_file(&path).unwrap();
    assert_eq!(config.owner, "archivist");
    assert_eq!(config.codec, bigzip::CodecId::Lz4);
    assert_eq!(config.granularity, Granularity::PerFile);
    assert_eq!(config.max_file_size, 10);
    assert_eq!(config.max_depth, 25);
    assert_eq!(config.on_error, ErrorPolicy::Skip);

    let ar = Archive::open_with(dir.path().join("t.big"), config).unwrap();
    assert!(index_text(&ar)[0].ends_with(" archivist"));
}

#[test]
fn test_extract_span_by_byte_coordinates() {
    let (_dir, ar) = fresh(ArchiveConfig::default());
    let a = ar.append_bytes(b"alpha", "/a.txt").unwrap();
    let b = ar.append_bytes(b"beta", "/b.txt").unwrap();

    let span = ar.extract_span(a.offset, b.offset).unwrap();
    assert_eq!(span.data, b"alpha");
    assert!(span.path.is_none());

    let located = ar.locate("/b.txt").unwrap().unwrap();
    assert_eq!(ar.extract_span(located.start, located.end).unwrap().data, b"beta");
    assert!(matches!(
        ar.extract_span(a.offset + 1, b.offset),
        Err(ArchiveError::MissingSignature { .. })
    ));
}

#[test]
fn test_append_folder_skips_own_archive_files() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    write_file(&src, "a.txt", b"a");
    write_file(&src, "z.txt", b"z");
    let mut ar = Archive::open(src.join("t.big")).unwrap();

    let report = ar.append_folder(&src).unwrap();
    let paths: Vec<_> = report.stored.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["/a.txt", "/z.txt"]);
    assert!(report.skipped.is_empty());
}
