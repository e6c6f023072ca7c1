use std::time::Duration;

use onestatsd::OneStatsdBuilder;

fn main() {
    tracing_subscriber::fmt::init();

    let statsd = OneStatsdBuilder::default().with_max_buffer_size(20).build();

    loop {
        // Everything sent through the batch goes out in datagrams of up to 20 metrics, with the remainder flushed when
        // the batch is dropped.
        {
            let batch = statsd.batch();
            for worker in 0..32 {
                let tag = format!("worker:{worker}");
                batch.gauge("queue.depth", worker * 3, &[tag.as_str()], 1.0);
                batch.increment("jobs.processed", 1, &[tag.as_str()], 1.0);
            }
        }

        std::thread::sleep(Duration::from_secs(1));
    }
}
