mod common;

use std::sync::Arc;

use common::{at, init_tracing, MockImageStore};
use rib_bbs::models::{Id, Post};
use rib_bbs::repo::json::JsonPostStore;
use rib_bbs::repo::PostRepo;
use rib_bbs::storage::ImageStore;
use rib_bbs::thumbnail::EncodedImages;
use rib_bbs::{BoardError, ErrorKind};

fn post(parent: Id, poster: &str, ms: i64) -> Post {
    Post {
        id: 0,
        parent,
        name: String::new(),
        subject: String::new(),
        body: format!("posted at {ms}"),
        image: false,
        poster: poster.into(),
        posted: at(ms),
        replies: vec![],
    }
}

fn with_image(mut p: Post, images: &MockImageStore) -> Post {
    p.image = true;
    let encoded = EncodedImages { full: vec![1], thumb: vec![2], width: 1, height: 1 };
    images.save(p.image_key(), &encoded).unwrap();
    p
}

/// Helper that returns a fresh store in its own temp dir.
fn store(max_bumps: usize) -> (tempfile::TempDir, Arc<MockImageStore>, JsonPostStore) {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let images = Arc::new(MockImageStore::default());
    let store = JsonPostStore::open(dir.path().join("posts.json"), images.clone(), max_bumps).unwrap();
    (dir, images, store)
}

#[test]
fn thread_reply_delete_scenario() {
    let (_dir, _images, s) = store(300);
    assert!(s.get_all().unwrap().is_empty());

    assert_eq!(s.add(post(0, "a", 1000)).unwrap(), 1);
    assert_eq!(s.add(post(1, "b", 2000)).unwrap(), 2);

    let all = s.get_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].replies.len(), 1);
    assert_eq!(all[0].replies[0].id, 2);

    s.delete(1).unwrap();
    assert!(s.get_all().unwrap().is_empty());
    assert!(matches!(s.get(1), Err(BoardError::UnknownPost(1))));
    assert!(matches!(s.get(2), Err(BoardError::UnknownPost(2))));
}

#[test]
fn ids_increase_across_threads_and_replies() {
    let (_dir, _images, s) = store(300);
    let mut last = 0;
    for i in 0..6 {
        let parent = if i % 2 == 0 { 0 } else { last };
        let id = s.add(post(parent, "a", 1000 + i)).unwrap();
        assert!(id > last);
        last = id;
    }
    assert_eq!(last, 6);
}

#[test]
fn missing_parent_leaves_file_untouched() {
    let (dir, _images, s) = store(300);
    s.add(post(0, "a", 1000)).unwrap();
    let path = dir.path().join("posts.json");
    let before = std::fs::read(&path).unwrap();

    let err = s.add(post(42, "a", 2000)).unwrap_err();
    assert!(matches!(err, BoardError::ParentNotFound(42)));
    assert_eq!(err.kind(), ErrorKind::ParentNotFound);
    assert_eq!(std::fs::read(&path).unwrap(), before);
    assert_eq!(s.get_all().unwrap()[0].replies.len(), 0);
}

#[test]
fn deleting_a_reply_keeps_the_thread() {
    let (_dir, images, s) = store(300);
    s.add(post(0, "a", 1000)).unwrap();
    let reply = with_image(post(1, "b", 2000), &images);
    s.add(reply).unwrap();
    s.add(post(1, "c", 3000)).unwrap();

    s.delete(2).unwrap();
    let thread = s.get(1).unwrap();
    assert_eq!(thread.replies.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3]);
    assert!(!images.exists(2000));
}

#[test]
fn deleting_a_thread_removes_every_image() {
    let (_dir, images, s) = store(300);
    s.add(with_image(post(0, "a", 1000), &images)).unwrap();
    s.add(with_image(post(1, "b", 2000), &images)).unwrap();
    s.add(post(1, "c", 3000)).unwrap();
    s.add(with_image(post(0, "d", 4000), &images)).unwrap();

    s.delete(1).unwrap();
    assert_eq!(images.keys(), vec![4000]);
    assert!(s.delete(1).is_err());
}

#[test]
fn bump_order_respects_cap() {
    let (_dir, _images, s) = store(1);
    s.add(post(0, "a", 1000)).unwrap(); // 1
    s.add(post(0, "a", 2000)).unwrap(); // 2
    s.add(post(1, "b", 3000)).unwrap(); // bumps 1 to 3000
    s.add(post(2, "b", 2500)).unwrap(); // bumps 2 to 2500
    s.add(post(2, "b", 9000)).unwrap(); // past the cap for 2

    let order: Vec<Id> = s.get_all().unwrap().iter().map(|t| t.id).collect();
    assert_eq!(order, vec![1, 2]);
}

#[test]
fn delete_by_poster_keeps_other_content() {
    let (_dir, images, s) = store(300);
    s.add(post(0, "troll", 1000)).unwrap(); // 1
    s.add(post(1, "bystander", 1100)).unwrap(); // 2, dies with thread 1
    s.add(post(0, "bystander", 1200)).unwrap(); // 3
    s.add(with_image(post(3, "troll", 1300), &images)).unwrap(); // 4
    s.add(post(3, "other", 1400)).unwrap(); // 5

    let removed = s.delete_by_poster("troll").unwrap();
    assert_eq!(removed, 2);

    let all = s.get_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, 3);
    assert_eq!(all[0].replies.iter().map(|r| r.id).collect::<Vec<_>>(), vec![5]);
    assert!(images.keys().is_empty());
    assert_eq!(s.delete_by_poster("nobody").unwrap(), 0);
}

#[test]
fn reopen_reads_back_the_file() {
    let (dir, images, s) = store(300);
    s.add(post(0, "a", 1000)).unwrap();
    s.add(post(1, "b", 2000)).unwrap();
    drop(s);

    let reopened = JsonPostStore::open(dir.path().join("posts.json"), images, 300).unwrap();
    let thread = reopened.get(1).unwrap();
    assert_eq!(thread.replies[0].poster, "b");
    assert_eq!(reopened.add(post(0, "c", 3000)).unwrap(), 3);
}

#[test]
fn null_file_is_an_empty_store() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("posts.json");
    std::fs::write(&path, "null").unwrap();
    let s = JsonPostStore::open(&path, Arc::new(MockImageStore::default()), 300).unwrap();
    assert!(s.get_all().unwrap().is_empty());

    std::fs::write(&path, "{not json").unwrap();
    let err = JsonPostStore::open(&path, Arc::new(MockImageStore::default()), 300).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::IoFailure);
}

#[test]
fn concurrent_adds_never_share_an_id() {
    let (_dir, _images, s) = store(300);
    let s = Arc::new(s);
    let root = s.add(post(0, "a", 1)).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let s = s.clone();
            std::thread::spawn(move || {
                (0..10)
                    .map(|i| {
                        let parent = if i % 2 == 0 { 0 } else { root };
                        s.add(post(parent, "x", 10 + t * 100 + i)).unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut ids: Vec<Id> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 80);
    assert_eq!(*ids.last().unwrap(), 81);
}
