use std::fs;
use std::path::PathBuf;

use bytes::BytesMut;
use hl7_mllp_sender::{Endpoint, FieldRef, Listener, OutputFormat, Phase, RunSummary, Runner, Scenario, UpdatePlan};
use tokio::task::JoinHandle;

/// Runs a listener that handles `connections` connections, one per delivered
/// payload, and hands back every message it saw.
async fn receiver(connections: usize) -> (Endpoint, JoinHandle<Vec<BytesMut>>) {
    let listener = Listener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let handle = tokio::spawn(async move {
        let mut received = Vec::new();
        for _ in 0..connections {
            received.extend(listener.serve_one().await.expect("serve"));
        }
        received
    });
    (Endpoint::local(port), handle)
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("hl7-mllp-sender-{}-{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("scratch dir");
    dir
}

fn field(message: &[u8], segment: &str, index: usize) -> String {
    let text = String::from_utf8_lossy(message);
    let line = text
        .split('\r')
        .find(|s| s.starts_with(segment))
        .unwrap_or_else(|| panic!("no {} segment in {}", segment, text));
    // MSH-1 is the separator itself, so MSH fields sit one position earlier
    let offset = if segment == "MSH" { 1 } else { 0 };
    line.split('|').nth(index - offset).unwrap_or_default().to_string()
}

#[tokio::test]
async fn sends_each_message_to_every_target() {
    let (first, first_rx) = receiver(3).await;
    let (second, second_rx) = receiver(3).await;

    let scenario = Scenario {
        targets: vec![first, second],
        count: 3,
        seed: Some(11),
        ..Scenario::default()
    };
    let summary = Runner::new(scenario).expect("runner").run().await.expect("run");

    assert_eq!(
        summary,
        RunSummary {
            generated: 3,
            sent: 3,
            delivered: 6,
            failed: 0
        }
    );

    let first = first_rx.await.expect("first receiver");
    let second = second_rx.await.expect("second receiver");
    assert_eq!(first, second);

    let patients: Vec<String> = first.iter().map(|m| field(m, "PID", 3)).collect();
    assert_eq!(patients, ["TEST10001", "TEST10002", "TEST10003"]);
    let statuses: Vec<String> = first.iter().map(|m| field(m, "ORC", 5)).collect();
    assert_eq!(statuses, ["SC", "IP", "HD"]);
}

#[tokio::test]
async fn updates_resend_with_rotated_field_and_are_saved() {
    let (target, rx) = receiver(3).await;
    let output = scratch_dir("updates");

    let scenario = Scenario {
        targets: vec![target],
        count: 1,
        first_sequence: 40,
        seed: Some(5),
        output_dir: Some(output.clone()),
        updates: Some(UpdatePlan {
            field: FieldRef::new("ORC", 5),
            values: vec!["IP".into(), "CM".into()],
            count: 2,
            interval_ms: 10,
        }),
        ..Scenario::default()
    };
    let summary = Runner::new(scenario).expect("runner").run().await.expect("run");
    assert_eq!(summary.generated, 1);
    assert_eq!(summary.sent, 3);
    assert_eq!(summary.delivered, 3);

    let received = rx.await.expect("receiver");
    let statuses: Vec<String> = received.iter().map(|m| field(m, "ORC", 5)).collect();
    assert_eq!(statuses, ["SC", "IP", "CM"]);
    // same order throughout
    assert!(received.iter().all(|m| field(m, "ORC", 2) == field(&received[0], "ORC", 2)));
    assert!(received.iter().all(|m| field(m, "PID", 3) == "TEST10040"));

    let mut saved: Vec<String> = fs::read_dir(&output)
        .expect("output dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    saved.sort();
    assert_eq!(saved.len(), 3);
    assert!(saved.iter().any(|n| n.ends_with("_0040.hl7")));
    assert!(saved.iter().any(|n| n.ends_with("_0040_u1.hl7")));
    assert!(saved.iter().any(|n| n.ends_with("_0040_u2.hl7")));

    fs::remove_dir_all(&output).expect("clean up");
}

#[tokio::test]
async fn status_updates_continue_from_the_generated_status() {
    let (target, rx) = receiver(5).await;

    let statuses = ["SC", "IP", "HD", "CM", "CA"];
    let scenario = Scenario {
        template: "orm-o01".into(),
        targets: vec![target],
        seed: Some(3),
        updates: Some(UpdatePlan {
            field: FieldRef::new("ORC", 5),
            values: statuses.iter().map(|s| s.to_string()).collect(),
            count: 4,
            interval_ms: 0,
        }),
        ..Scenario::default()
    };
    let summary = Runner::new(scenario).expect("runner").run().await.expect("run");
    assert_eq!(summary.sent, 5);

    let received = rx.await.expect("receiver");
    let sent: Vec<String> = received.iter().map(|m| field(m, "ORC", 5)).collect();
    assert_eq!(sent, statuses);
}

#[tokio::test]
async fn merges_follow_the_updates_they_name() {
    let (target, rx) = receiver(4).await;

    let scenario = Scenario {
        template: "adt-a08".into(),
        targets: vec![target],
        count: 2,
        then: vec![Phase {
            template: "adt-a43".into(),
            count: 2,
        }],
        ..Scenario::default()
    };
    let summary = Runner::new(scenario).expect("runner").run().await.expect("run");
    assert_eq!(summary.generated, 4);

    let received = rx.await.expect("receiver");
    let kinds: Vec<String> = received.iter().map(|m| field(m, "MSH", 9)).collect();
    assert_eq!(kinds, ["ADT^A08", "ADT^A08", "ADT^A43", "ADT^A43"]);

    let updated: Vec<String> = received[..2].iter().map(|m| field(m, "PID", 3)).collect();
    for (merge, prior) in received[2..].iter().zip(&updated) {
        assert_eq!(&field(merge, "MRG", 1), prior);
        assert_eq!(&field(merge, "MRG", 2), prior);
        assert_ne!(&field(merge, "PID", 3), prior);
    }
}

#[tokio::test]
async fn json_output_is_written_alongside_delivery() {
    let (target, rx) = receiver(2).await;
    let output = scratch_dir("json");

    let scenario = Scenario {
        targets: vec![target],
        count: 2,
        output_dir: Some(output.clone()),
        output_format: OutputFormat::Json,
        ..Scenario::default()
    };
    Runner::new(scenario).expect("runner").run().await.expect("run");
    let received = rx.await.expect("receiver");

    let text = fs::read_to_string(output.join("hl7_message_2.json")).expect("second message saved");
    let document: serde_json::Value = serde_json::from_str(&text).expect("valid JSON");
    assert_eq!(document["name"], "name2.ORM");
    assert_eq!(document["type"], "HL7");
    let expected = format!("{}\n", String::from_utf8_lossy(&received[1]).replace('\r', "\n"));
    assert_eq!(document["content"], expected.as_str());

    fs::remove_dir_all(&output).expect("clean up");
}

#[tokio::test]
async fn unreachable_target_is_counted_not_fatal() {
    let (live, rx) = receiver(2).await;
    let closed = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        Endpoint::local(listener.local_addr().expect("addr").port())
    };

    let scenario = Scenario {
        template: "adt-a08".into(),
        targets: vec![closed, live],
        count: 2,
        ..Scenario::default()
    };
    let summary = Runner::new(scenario).expect("runner").run().await.expect("run");

    assert_eq!(summary.delivered, 2);
    assert_eq!(summary.failed, 2);
    assert_eq!(rx.await.expect("receiver").len(), 2);
}

#[tokio::test]
async fn scenario_file_paths_are_relative_to_the_file() {
    let (target, rx) = receiver(2).await;
    let dir = scratch_dir("scenario");
    fs::write(dir.join("obr5.csv"), "OBR-5\nS\nR\n").expect("dataset");
    fs::write(
        dir.join("scenario.toml"),
        format!(
            "template = \"orm-o01\"\ntargets = [\"{}\"]\ncount = 2\ndataset = \"obr5.csv\"\noutput_dir = \"out\"\n",
            target
        ),
    )
    .expect("scenario");

    let scenario = Scenario::from_path(dir.join("scenario.toml")).expect("load scenario");
    let summary = Runner::new(scenario).expect("runner").run().await.expect("run");
    assert_eq!(summary.delivered, 2);

    let received = rx.await.expect("receiver");
    let priorities: Vec<String> = received.iter().map(|m| field(m, "OBR", 5)).collect();
    assert_eq!(priorities, ["S", "R"]);
    assert_eq!(fs::read_dir(dir.join("out")).expect("output dir").count(), 2);

    fs::remove_dir_all(&dir).expect("clean up");
}
