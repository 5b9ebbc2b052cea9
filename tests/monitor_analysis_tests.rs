use canbus_sim::bus::FrameBus;
use canbus_sim::core::{CanId, Frame, FrameSource};
use canbus_sim::monitor::{FilterMode, TrafficMonitor};
use std::time::Duration;
use tokio::time::sleep;

fn publish(bus: &FrameBus, id: &str, data: &str) {
    bus.publish(Frame::parse(id, data, bus.clock().now(), FrameSource::Live).unwrap());
}

fn id(s: &str) -> CanId {
    s.parse().unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_frequency_of_periodic_sender() {
    let bus = FrameBus::new(1024);
    let monitor = TrafficMonitor::new(bus.clone());
    monitor.start();

    for _ in 0..30 {
        publish(&bus, "0x100", "00");
        sleep(Duration::from_millis(100)).await;
    }

    let report = monitor.analyze_frequency(Some(id("0x100")), 10.0);
    assert_eq!(report.count, 30);
    assert!((report.frequency - 10.0).abs() < 0.1, "got {} Hz", report.frequency);

    let windowed = monitor.analyze_frequency(Some(id("0x100")), 1.0);
    assert!(windowed.count <= 11);

    assert_eq!(monitor.analyze_frequency(Some(id("0x7FF")), 10.0).frequency, 0.0);
    monitor.stop();
}

#[tokio::test(start_paused = true)]
async fn test_filters_limit_history_but_not_baseline() {
    let bus = FrameBus::new(1024);
    let monitor = TrafficMonitor::new(bus.clone());
    monitor.start();
    monitor.add_id_filter(id("0x1A2"), true);

    publish(&bus, "0x100", "01");
    publish(&bus, "0x1A2", "AA");
    sleep(Duration::from_millis(10)).await;

    assert!(monitor.history(id("0x100")).is_empty());
    assert_eq!(monitor.history(id("0x1A2")).len(), 1);
    assert_eq!(monitor.last_seen(id("0x100")).unwrap().to_hex(), "01");
    assert_eq!(monitor.baseline().len(), 2);

    monitor.clear_filters();
    monitor.set_filter_mode(FilterMode::Exclude);
    monitor.add_data_filter("^FF", false).unwrap();
    publish(&bus, "0x200", "FF00");
    publish(&bus, "0x200", "00FF");
    sleep(Duration::from_millis(10)).await;

    let kept = monitor.history(id("0x200"));
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].data.to_hex(), "00FF");

    assert_eq!(monitor.add_data_filter("(", true).unwrap_err().kind(), "InvalidRequest");
}

#[tokio::test(start_paused = true)]
async fn test_correlated_ids_ranked_by_proximity_count() {
    let bus = FrameBus::new(1024);
    let monitor = TrafficMonitor::new(bus.clone());
    monitor.start();

    for _ in 0..3 {
        publish(&bus, "0x1A2", "AA");
        sleep(Duration::from_millis(20)).await;
        publish(&bus, "0x300", "01");
        publish(&bus, "0x301", "01");
        publish(&bus, "0x300", "02");
        sleep(Duration::from_secs(2)).await;
        publish(&bus, "0x400", "00");
        sleep(Duration::from_secs(2)).await;
    }
    sleep(Duration::from_millis(10)).await;

    let related = monitor.correlated_ids(id("0x1A2"), 0.1);
    assert_eq!(related, vec![id("0x300"), id("0x301")]);
    assert!(monitor.correlated_ids(id("0x555"), 0.1).is_empty());
}
