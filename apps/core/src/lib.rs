pub mod activation;
pub mod arbiter;
pub mod backend;
pub mod config;
pub mod launcher;
pub mod logging;
pub mod model;
pub mod protocol;
pub mod reindex;
pub mod runtime;
pub mod session;
pub mod surface;

#[cfg(test)]
mod tests {
    mod line_throughput_test {
        include!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../../tests/perf/line_throughput_test.rs"
        ));
    }
}
