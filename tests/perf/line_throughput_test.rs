use std::time::Instant;

use crate::activation::ActivationPolicy;
use crate::backend::RecordingChannel;
use crate::session::SessionCoordinator;
use crate::surface::MockSurface;

fn p95_ms(samples: &mut [f64]) -> f64 {
    samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let last = samples.len().saturating_sub(1);
    let idx = ((last as f64) * 0.95).round() as usize;
    samples[idx.min(last)]
}

fn batch(query: &str, size: usize) -> Vec<String> {
    let mut lines = Vec::with_capacity(size + 1);
    lines.push(format!(":{query}"));
    lines.extend((0..size).map(|i| format!("Document_{i:05}.txt|/docs/Document_{i:05}.txt")));
    lines
}

#[test]
fn result_batch_of_2000_lines_p95_under_100ms() {
    let current = batch("report", 2_000);
    let stale = batch("repor", 2_000);

    let mut samples = Vec::with_capacity(40);
    for _ in 0..40 {
        let mut coordinator = SessionCoordinator::new(
            RecordingChannel::default(),
            MockSurface::default(),
            ActivationPolicy::default(),
            "Ctrl+Space",
        );
        coordinator.on_backend_line(":indexed");
        coordinator.on_input_changed("repor");
        coordinator.on_input_changed("report");

        let start = Instant::now();
        for line in stale.iter().chain(current.iter()) {
            coordinator.on_backend_line(line);
        }
        samples.push(start.elapsed().as_secs_f64() * 1000.0);

        assert_eq!(coordinator.session().result_count, 2_000);
        assert_eq!(coordinator.session().discarded_results, 2_000);
    }

    let p95 = p95_ms(&mut samples);
    assert!(p95 <= 100.0, "p95 too high: {p95:.3}ms (budget 100.0ms)");
}
