//! Manual smoke-test driver for `KafkaConsumer`: parse a handful of
//! command-line flags with `getopts`, join a group, and print every
//! message to stdout until interrupted.
//!
//! This is scaffolding for manual testing against a real cluster, not a
//! top-level façade in its own right — it lives under `demos/` rather
//! than `examples/` only because this workspace's `examples/` directory is
//! reserved for retrieved reference material.

#[macro_use]
extern crate log;
extern crate pretty_env_logger;
extern crate getopts;
extern crate futures_cpupool;

extern crate kafka_group_client;

use std::env;
use std::path::Path;
use std::process;

use getopts::Options;

use futures_cpupool::CpuPool;

use kafka_group_client::client::{ClientConfig, Cluster, KafkaClient};
use kafka_group_client::consumer::{ConsumerConfig, KafkaConsumer};
use kafka_group_client::FetchOffset;

const DEFAULT_BROKER: &str = "127.0.0.1:9092";
const DEFAULT_CLIENT_ID: &str = "console-consumer";
const DEFAULT_TOPIC: &str = "my-topic";

#[derive(Clone, Debug)]
struct Config {
    brokers: Vec<String>,
    client_id: String,
    topics: Vec<String>,
    group_id: String,
    from_latest: bool,
}

impl Config {
    fn parse_cmdline() -> Config {
        let args: Vec<String> = env::args().collect();
        let program = Path::new(&args[0]).file_name().unwrap().to_str().unwrap().to_owned();
        let mut opts = Options::new();

        opts.optflag("h", "help", "print this help menu");
        opts.optopt("b", "bootstrap-server", "bootstrap broker(s), comma separated", "HOSTS");
        opts.optopt("", "client-id", "identifier sent in every request", "ID");
        opts.optopt("g", "group-id", "consumer group name", "NAME");
        opts.optopt("t", "topics", "topics to subscribe to, comma separated", "NAMES");
        opts.optflag("", "from-latest", "start new partitions from the latest offset instead of the earliest");

        let matches = opts.parse(&args[1..]).unwrap_or_else(|err| {
            eprintln!("{}", err);
            process::exit(1);
        });

        if matches.opt_present("h") {
            print!("{}", opts.usage(&format!("Usage: {} [options]", program)));
            process::exit(0);
        }

        let brokers = matches.opt_str("b")
            .map(|s| s.split(',').map(|s| s.trim().to_owned()).collect())
            .unwrap_or_else(|| vec![DEFAULT_BROKER.to_owned()]);
        let topics = matches.opt_str("t")
            .map(|s| s.split(',').map(|s| s.trim().to_owned()).collect())
            .unwrap_or_else(|| vec![DEFAULT_TOPIC.to_owned()]);

        Config {
            brokers: brokers,
            client_id: matches.opt_str("client-id").unwrap_or_else(|| DEFAULT_CLIENT_ID.to_owned()),
            topics: topics,
            group_id: matches.opt_str("g").unwrap_or_else(|| "console-consumer-group".to_owned()),
            from_latest: matches.opt_present("from-latest"),
        }
    }
}

fn main() {
    pretty_env_logger::init().expect("failed to initialize logger");

    let config = Config::parse_cmdline();
    debug!("parsed config: {:?}", config);

    if let Err(err) = run(config) {
        error!("console-consumer failed: {}", err);
        process::exit(1);
    }
}

fn run(config: Config) -> kafka_group_client::Result<()> {
    let client_config = ClientConfig::new(config.brokers).with_client_id(config.client_id);
    let cluster = Cluster::new(client_config.clone())?;
    let client = KafkaClient::from_cluster(client_config, cluster.clone());

    let consumer_config = ConsumerConfig::new(config.group_id);
    let pool = CpuPool::new_num_cpus();

    let mut consumer = KafkaConsumer::new(cluster, client, consumer_config, pool);

    let default_offset = if config.from_latest { FetchOffset::Latest } else { FetchOffset::Earliest };
    for topic in &config.topics {
        consumer.subscribe(topic, default_offset);
    }

    loop {
        consumer.each_message(|message| {
            println!("{}-{}@{}: {:?}",
                     message.topic,
                     message.partition,
                     message.offset,
                     message.value.as_ref().map(|v| String::from_utf8_lossy(v)));
            Ok(())
        })?;
    }
}
