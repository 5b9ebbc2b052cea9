use super::MetricsSnapshot;

/// Renders bus metrics as a human-readable report
pub struct BusMonitor {
    snapshot: MetricsSnapshot,
}

impl BusMonitor {
    pub fn new(snapshot: MetricsSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn generate_report(&self) -> String {
        let mut report = format!(
            "=== Bus Metrics ===\nPublished: {} frames\n",
            self.snapshot.published
        );

        if self.snapshot.subscribers.is_empty() {
            report.push_str("No subscribers registered\n");
            return report;
        }

        let mut names: Vec<&String> = self.snapshot.subscribers.keys().collect();
        names.sort();

        for name in names {
            let sub = &self.snapshot.subscribers[name];
            report.push_str(&format!(
                "\n[{}]\n  Delivered: {} frames\n  Dropped: {}\n  Overflow notices: {}\n",
                name,
                sub.delivered,
                if sub.dropped > 0 {
                    format!("{} frame{}", sub.dropped, if sub.dropped == 1 { "" } else { "s" })
                } else {
                    "0 frames".to_string()
                },
                sub.overflow_notices
            ));
        }

        report
    }
}
