use std::{thread::sleep, time::Duration};

use statsd_client::StatsdBuilder;

fn main() {
    tracing_subscriber::fmt::init();

    let statsd = StatsdBuilder::default()
        .with_remote_address("localhost:8125")
        .expect("failed to parse remote address")
        .with_namespace("example")
        .build()
        .expect("failed to build emitter");

    // Loop over and over, pretending to do some work.
    loop {
        statsd.increment("loops", None).expect("failed to send counter");

        let result = statsd
            .time("work", Some(0.5), || {
                sleep(Duration::from_millis(rand::random_range(5..50)));
                rand::random_bool(0.9)
            })
            .expect("failed to send timing");

        if !result {
            statsd.increment("failures", None).expect("failed to send counter");
        }

        statsd.meter_reading("queue.depth", rand::random_range(0..100), None).expect("failed to send reading");
        sleep(Duration::from_secs(1));
    }
}
