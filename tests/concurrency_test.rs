//! Taps driven from several I/O tasks at once

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fabric_peek::channel::constants::CONTENT_TYPE_CONTROL;
use fabric_peek::channel::{Message, PeekHandler};
use fabric_peek::metrics::{export_report_json, UsageReporter};
use fabric_peek::xgress::{self, Originator, Payload, SessionFlow};
use fabric_peek::{MetricsRegistry, SessionPeekTap, SharedTransportMetrics, TransportPeekTap};

const TASKS: u64 = 8;
const MESSAGES_PER_TASK: u64 = 500;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_link_traffic() -> anyhow::Result<()> {
    let registry = Arc::new(MetricsRegistry::new());
    let shared = Arc::new(SharedTransportMetrics::new(registry.as_ref()));
    let links: Vec<Arc<TransportPeekTap>> = (0..2)
        .map(|i| {
            let link_id = format!("link{}", i);
            Arc::new(TransportPeekTap::with_shared(link_id, shared.clone(), registry.as_ref()))
        })
        .collect();

    let mut handles = Vec::new();
    for task in 0..TASKS {
        let tap = links[(task % 2) as usize].clone();
        handles.push(tokio::spawn(async move {
            for i in 0..MESSAGES_PER_TASK {
                if task % 4 < 2 {
                    tap.rx(&Message::new(CONTENT_TYPE_CONTROL, vec![0u8; 16]));
                } else {
                    let session = format!("session-{}", i % 4);
                    tap.tx(&Payload::new(session, vec![0u8; 8]).encode().unwrap());
                }
                if i % 100 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }
    for handle in handles {
        handle.await?;
    }

    let per_direction = TASKS / 2 * MESSAGES_PER_TASK;
    let count = |name: &str| registry.meter_snapshot(name).map(|snapshot| snapshot.count);
    assert_eq!(count("fabric.rx.msgrate"), Some(per_direction));
    assert_eq!(count("fabric.rx.bytesrate"), Some(per_direction * 16));

    let tx_body = 8 + "session-0".len() as u64 + 8;
    assert_eq!(count("fabric.tx.bytesrate"), Some(per_direction * tx_body));
    let link_tx: u64 = (0..2)
        .filter_map(|i| count(&format!("link.link{}.tx.msgrate", i)))
        .sum();
    assert_eq!(link_tx, per_direction);

    let usage = registry.usage_counter("usage.fabric.tx").unwrap();
    let charged: u64 = usage.keys().iter().map(|key| usage.total_for(key)).sum();
    assert_eq!(charged, per_direction * 8);

    for link in &links {
        link.close();
    }
    assert!(registry.metric_names().iter().all(|name| !name.starts_with("link.")));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sessions_and_report() -> anyhow::Result<()> {
    let registry = Arc::new(MetricsRegistry::new());
    let tap = Arc::new(SessionPeekTap::new(registry.as_ref()));

    let mut handles = Vec::new();
    for task in 0..TASKS {
        let tap = tap.clone();
        handles.push(tokio::spawn(async move {
            let originator = match task % 2 {
                0 => Originator::Initiator,
                _ => Originator::Acceptor,
            };
            let flow = SessionFlow::new(format!("S{}", task), originator);
            for _ in 0..MESSAGES_PER_TASK {
                let payload = Payload::new(flow.session_token.clone(), vec![0u8; 3]);
                xgress::PeekHandler::rx(tap.as_ref(), &flow, &payload);
                xgress::PeekHandler::tx(tap.as_ref(), &flow, &payload);
            }
            xgress::PeekHandler::close(tap.as_ref(), &flow);
        }));
    }
    for handle in handles {
        handle.await?;
    }

    let per_class = TASKS / 2 * MESSAGES_PER_TASK;
    for class in ["ingress", "egress"] {
        for direction in ["rx", "tx"] {
            let scope = format!("{}.{}", class, direction);
            let messages = registry.meter_snapshot(&format!("{}.msgrate", scope)).unwrap();
            assert_eq!(messages.count, per_class);
            let sizes = registry.histogram_snapshot(&format!("{}.msgsize", scope)).unwrap();
            assert_eq!(sizes.sum, per_class * 3);
        }
    }
    let ingress_rx = registry.usage_counter("usage.ingress.rx").unwrap();
    assert_eq!(ingress_rx.total_for("S0"), MESSAGES_PER_TASK * 3);
    let egress_tx = registry.usage_counter("usage.egress.tx").unwrap();
    assert_eq!(egress_tx.total_for("S1"), MESSAGES_PER_TASK * 3);

    // Everything recorded so far falls in buckets that are complete an hour from now
    let later = SystemTime::now() + Duration::from_secs(3600);
    let report = UsageReporter::new(registry.clone()).collect(later)?;
    assert_eq!(report.summary.unique_sessions, TASKS);
    assert_eq!(report.summary.total_bytes, TASKS * MESSAGES_PER_TASK * 3 * 2);
    assert!(export_report_json(&report)?.contains("usage.egress.rx"));

    Ok(())
}
