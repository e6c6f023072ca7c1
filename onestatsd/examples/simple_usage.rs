use std::time::Duration;

use onestatsd::OneStatsdBuilder;

fn main() {
    tracing_subscriber::fmt::init();

    OneStatsdBuilder::default()
        .with_remote_address("localhost:8251")
        .expect("failed to parse remote address")
        .with_constant_tags(["service:demo"])
        .install()
        .expect("failed to install OneStatsd client");

    let statsd = onestatsd::global();

    // Loop over and over, pretending to serve some pages.
    let mut online = 0_i64;
    loop {
        statsd.increment("page.views", 1, &["page:home"], 1.0);
        statsd.increment("page.render_checks", 1, &[], 0.1);

        online = (online + 1) % 100;
        statsd.gauge("users.online", online, &[], 1.0);

        if online % 10 == 0 {
            statsd.decrement("files.remaining", 2, &[], 1.0);
        }

        std::thread::sleep(Duration::from_millis(50));
    }
}
