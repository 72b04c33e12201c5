use archiver_core::{normalize_url, relative_href, sequential_filename, ImageSequence, LinkMapBuilder};
use pretty_assertions::assert_eq;

#[test]
fn first_occurrence_indexing_reuses_duplicates() {
    let seq = ImageSequence::from_refs(["A", "B", "A", "C"]);
    let names: Vec<_> = ["A", "B", "A", "C"]
        .iter()
        .map(|url| sequential_filename(seq.get(url).unwrap(), "webp"))
        .collect();
    assert_eq!(
        names,
        vec!["image01.webp", "image02.webp", "image01.webp", "image03.webp"]
    );
    assert_eq!(seq.len(), 3);
}

#[test]
fn normalization_drops_fragment_tracking_and_trailing_slash() {
    assert_eq!(
        normalize_url("https://Medium.com/@julsimon/post-abc/?source=rss----1&utm_medium=x#section"),
        "https://medium.com/@julsimon/post-abc"
    );
    assert_eq!(
        normalize_url("https://example.com/?p=42"),
        "https://example.com/?p=42"
    );
    assert_eq!(normalize_url("  ../other/index.html "), "../other/index.html");
}

#[test]
fn first_registration_wins_and_conflicts_are_reported() {
    let mut builder = LinkMapBuilder::new();
    assert!(builder
        .register("2017/a", ["https://medium.com/@j/a-1234abcd5678"])
        .is_empty());
    let conflicts = builder.register("2018/b", ["https://medium.com/@j/a-1234abcd5678/"]);
    assert_eq!(conflicts, vec!["https://medium.com/@j/a-1234abcd5678"]);

    let map = builder.build();
    assert_eq!(map.lookup("https://medium.com/@j/a-1234abcd5678#top"), Some("2017/a"));
    assert!(map.covers("2018/b"));
    assert_eq!(map.post_count(), 2);
    assert_eq!(map.len(), 1);
}

#[test]
fn relative_hrefs_walk_up_to_the_common_root() {
    assert_eq!(relative_href("2017/a", "2018/b", "index.html"), "../../2018/b/index.html");
    assert_eq!(relative_href("2017/a", "2017/b", "index.html"), "../b/index.html");
    assert_eq!(relative_href("a", "b", "index.html"), "../b/index.html");
    assert_eq!(relative_href("2017/a", "2017/a", "index.html"), "index.html");
}
