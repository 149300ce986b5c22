//! Admission gate behaviour through the public API, driven by list files the
//! way the binary loads them.

use lowerbound_proxy::admission::{Priority, Release};
use lowerbound_proxy::classify::{Admission, AdmissionGate};
use lowerbound_proxy::config::AdmissionConfig;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

fn list(lines: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file
}

async fn wait_for_depth(gate: &AdmissionGate, expected: (usize, usize)) {
    let queue = gate.queue().unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while queue.depth() != expected {
        assert!(Instant::now() < deadline, "depth stuck at {:?}", queue.depth());
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

#[tokio::test]
async fn test_prefetched_resources_wait_behind_page_resources() {
    let prefetch = list(&["https://shop.test/next/hero.jpg", "https://shop.test/next/app.js"]);
    let config = AdmissionConfig {
        prefetch_urls: Some(prefetch.path().to_path_buf()),
        ..Default::default()
    };
    let gate = Arc::new(AdmissionGate::from_config(&config).unwrap());
    let queue = gate.queue().unwrap();
    let events = queue.subscribe();
    queue.pause();

    let mut tasks = Vec::new();
    for (url, depth) in [
        ("https://shop.test/next/hero.jpg", (0, 1)),
        ("https://shop.test/next/app.js", (0, 2)),
        ("https://shop.test/cart", (1, 2)),
    ] {
        let task_gate = Arc::clone(&gate);
        tasks.push(tokio::spawn(async move { task_gate.admit(url).await }));
        wait_for_depth(&gate, depth).await;
    }
    gate.queue().unwrap().resume();

    let mut priorities = Vec::new();
    for task in tasks {
        match task.await.unwrap() {
            Admission::Released {
                priority, release, ..
            } => {
                assert_eq!(release, Release::Dispatched);
                priorities.push(priority);
            }
            Admission::Bypassed => panic!("scheduled gate bypassed a response"),
        }
    }
    assert_eq!(priorities, [Priority::Low, Priority::Low, Priority::High]);

    let order: Vec<String> = events.try_iter().map(|e| e.url).collect();
    assert_eq!(
        order,
        [
            "https://shop.test/cart",
            "https://shop.test/next/hero.jpg",
            "https://shop.test/next/app.js",
        ]
    );
    gate.shutdown();
}

#[tokio::test]
async fn test_held_responses_time_out() {
    let important = list(&[]);
    let config = AdmissionConfig {
        important_urls: Some(important.path().to_path_buf()),
        max_wait_ms: Some(30),
        ..Default::default()
    };
    let gate = AdmissionGate::from_config(&config).unwrap();
    gate.queue().unwrap().pause();

    match gate.admit("https://slow.test/").await {
        Admission::Released {
            release, waited, ..
        } => {
            assert_eq!(release, Release::TimedOut);
            assert!(waited >= Duration::from_millis(30));
        }
        Admission::Bypassed => panic!("scheduled gate bypassed a response"),
    }
    gate.shutdown();
}

#[tokio::test]
async fn test_shutdown_releases_held_responses() {
    let important = list(&[]);
    let config = AdmissionConfig {
        important_urls: Some(important.path().to_path_buf()),
        ..Default::default()
    };
    let gate = Arc::new(AdmissionGate::from_config(&config).unwrap());
    gate.queue().unwrap().pause();

    let held = {
        let gate = Arc::clone(&gate);
        tokio::spawn(async move { gate.admit("https://held.test/").await })
    };
    wait_for_depth(&gate, (0, 1)).await;
    gate.shutdown();

    assert!(matches!(
        held.await.unwrap(),
        Admission::Released {
            release: Release::Drained,
            ..
        }
    ));
    assert!(matches!(
        gate.admit("https://late.test/").await,
        Admission::Released {
            release: Release::Closed,
            ..
        }
    ));
}
