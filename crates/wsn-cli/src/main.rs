//! wsn - run a cluster head, a sensor client or a sink

use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use wsn_client::SensorClient;
use wsn_cluster::ClusterHead;
use wsn_core::{
    ClientConfig, ClusterHeadConfig, ElectionConfig, MulticastConfig, NodeAddress, PortMap, RecordingRadio,
    StaticLinkQuality,
};
use wsn_runtime::{Node, NodeConfig, SinkCollector};

#[derive(Parser)]
#[command(name = "wsn")]
#[command(author, version, about = "Cluster-head WSN overlay node", long_about = None)]
struct Cli {
    /// More logging (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a cluster head
    ClusterHead {
        #[command(flatten)]
        net: NetArgs,

        #[command(flatten)]
        link: LinkArgs,

        /// Border router receiving forwarded data
        #[arg(long, default_value = "fd00:0:0:5000::1")]
        sink: NodeAddress,

        /// Shrink election timers to seconds
        #[arg(long)]
        fast: bool,

        #[command(flatten)]
        election: ElectionArgs,
    },

    /// Run a sensor client
    Client {
        #[command(flatten)]
        net: NetArgs,

        #[command(flatten)]
        link: LinkArgs,

        /// Shrink report timers to seconds
        #[arg(long)]
        fast: bool,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// Receive and log forwarded data
    Sink {
        #[arg(long, default_value = "::")]
        bind: IpAddr,

        #[arg(long, default_value_t = PortMap::default().sink)]
        port: u16,
    },
}

#[derive(Args)]
struct NetArgs {
    /// Local address to bind
    #[arg(long, default_value = "::")]
    bind: IpAddr,

    /// Multicast group of both discovery and election traffic
    #[arg(long, default_value = "ff1e::89:abcd")]
    group: Ipv6Addr,

    /// Interface index for multicast (0 = kernel default)
    #[arg(long, default_value_t = 0)]
    interface: u32,

    /// Unicast only
    #[arg(long)]
    no_multicast: bool,
}

impl NetArgs {
    fn multicast(&self) -> MulticastConfig {
        MulticastConfig {
            enabled: !self.no_multicast,
            group: self.group,
            interface: self.interface,
        }
    }
}

#[derive(Args)]
struct LinkArgs {
    /// RSSI reported for peers without a --link entry
    #[arg(long, default_value_t = -70, allow_negative_numbers = true)]
    rssi: i16,

    /// Per-peer RSSI as ADDR=DBM, repeatable
    #[arg(long = "link", value_parser = parse_link)]
    links: Vec<(NodeAddress, i16)>,

    /// Seed for the random draws (default: entropy)
    #[arg(long)]
    seed: Option<u64>,
}

impl LinkArgs {
    fn link_quality(&self) -> StaticLinkQuality {
        self.links
            .iter()
            .fold(StaticLinkQuality::new(self.rssi), |lq, (addr, rssi)| {
                lq.with_entry(*addr, *rssi)
            })
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

/// Overrides of the election schedule, on top of the default or --fast one
#[derive(Args, Debug, Default)]
struct ElectionArgs {
    /// Smallest election value drawn
    #[arg(long)]
    value_min: Option<u32>,

    /// Largest election value drawn
    #[arg(long)]
    value_max: Option<u32>,

    /// First draw (e.g. 60s)
    #[arg(long, value_parser = humantime::parse_duration)]
    draw_first: Option<Duration>,

    #[arg(long, value_parser = humantime::parse_duration)]
    draw_interval: Option<Duration>,

    /// First value broadcast, must come after the first draw
    #[arg(long, value_parser = humantime::parse_duration)]
    broadcast_first: Option<Duration>,

    #[arg(long, value_parser = humantime::parse_duration)]
    broadcast_interval: Option<Duration>,

    /// First discovery announcement to clients
    #[arg(long, value_parser = humantime::parse_duration)]
    discovery_first: Option<Duration>,

    #[arg(long, value_parser = humantime::parse_duration)]
    discovery_interval: Option<Duration>,
}

impl ElectionArgs {
    fn apply(&self, election: &mut ElectionConfig) {
        if let Some(v) = self.value_min {
            election.value_min = v;
        }
        if let Some(v) = self.value_max {
            election.value_max = v;
        }
        for (flag, field) in [
            (self.draw_first, &mut election.draw_first),
            (self.draw_interval, &mut election.draw_interval),
            (self.broadcast_first, &mut election.broadcast_first),
            (self.broadcast_interval, &mut election.broadcast_interval),
            (self.discovery_first, &mut election.discovery_first),
            (self.discovery_interval, &mut election.discovery_interval),
        ] {
            if let Some(d) = flag {
                *field = d;
            }
        }
    }
}

/// Overrides of the client report loop
#[derive(Args, Debug, Default)]
struct ReportArgs {
    /// Report payload
    #[arg(long)]
    payload: Option<String>,

    /// Report period (e.g. 31s)
    #[arg(long, value_parser = humantime::parse_duration)]
    period: Option<Duration>,

    /// Delay before the first report (e.g. 150s)
    #[arg(long, value_parser = humantime::parse_duration)]
    setup_delay: Option<Duration>,

    /// Random extra backoff before each report (e.g. 500ms)
    #[arg(long, value_parser = humantime::parse_duration)]
    jitter: Option<Duration>,

    /// Initial transmit power level
    #[arg(long)]
    initial_power: Option<u8>,
}

impl ReportArgs {
    fn apply(&self, config: &mut ClientConfig) {
        if let Some(payload) = &self.payload {
            config.report.payload = payload.clone();
        }
        if let Some(period) = self.period {
            config.report.period = period;
        }
        if let Some(setup_delay) = self.setup_delay {
            config.report.setup_delay = setup_delay;
        }
        if let Some(jitter) = self.jitter {
            config.report.backoff_jitter = jitter;
        }
        if let Some(level) = self.initial_power {
            config.power.initial_level = level;
        }
    }
}

fn parse_link(s: &str) -> Result<(NodeAddress, i16), String> {
    let (addr, rssi) = s
        .rsplit_once('=')
        .ok_or_else(|| format!("expected ADDR=DBM, got {s:?}"))?;
    let addr = addr
        .parse::<NodeAddress>()
        .map_err(|e| format!("bad address {addr:?}: {e}"))?;
    let rssi = rssi
        .parse::<i16>()
        .map_err(|e| format!("bad RSSI {rssi:?}: {e}"))?;
    Ok((addr, rssi))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("cannot listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn run_cluster_head(
    net: NetArgs,
    link: LinkArgs,
    sink: NodeAddress,
    fast: bool,
    election: ElectionArgs,
) -> Result<()> {
    let mut config = if fast {
        ClusterHeadConfig::fast()
    } else {
        ClusterHeadConfig::default()
    };
    config.bind_addr = net.bind;
    config.multicast = net.multicast();
    config.sink = sink;
    election.apply(&mut config.election);
    config.validate().context("invalid cluster head configuration")?;

    let head = ClusterHead::new(config.clone(), link.link_quality(), link.rng());
    let mut node = Node::bind(head, NodeConfig::from(&config))
        .await
        .context("cluster head startup failed")?;

    info!(sink = %config.sink, "cluster head running");
    node.run_until(shutdown_signal()).await?;

    let stats = node.behavior().router().stats();
    info!(
        to_sink = stats.to_sink,
        relayed = stats.relayed,
        feedback = stats.feedback_sent,
        rounds = node.behavior().election().rounds_closed(),
        "cluster head stopped"
    );
    Ok(())
}

async fn run_client(net: NetArgs, link: LinkArgs, fast: bool, report: ReportArgs) -> Result<()> {
    let mut config = if fast {
        ClientConfig::fast()
    } else {
        ClientConfig::default()
    };
    config.bind_addr = net.bind;
    config.multicast = net.multicast();
    report.apply(&mut config);
    config.validate().context("invalid client configuration")?;

    let client = SensorClient::new(
        config.clone(),
        link.link_quality(),
        RecordingRadio::new(),
        link.rng(),
    );
    let mut node = Node::bind(client, NodeConfig::from(&config))
        .await
        .context("client startup failed")?;

    info!(
        period = %humantime::format_duration(config.report.period),
        "client running"
    );
    node.run_until(shutdown_signal()).await?;

    let client = node.behavior();
    info!(
        ch = ?client.selected_ch(),
        power = client.power_level(),
        sent = client.reports().sent(),
        suppressed = client.reports().suppressed(),
        "client stopped"
    );
    Ok(())
}

async fn run_sink(bind: IpAddr, port: u16) -> Result<()> {
    let mut sink = SinkCollector::bind(SocketAddr::new(bind, port))
        .await
        .context("sink startup failed")?;
    sink.run_until(shutdown_signal()).await?;
    info!(received = sink.received(), "sink stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::ClusterHead {
            net,
            link,
            sink,
            fast,
            election,
        } => run_cluster_head(net, link, sink, fast, election).await,
        Commands::Client {
            net,
            link,
            fast,
            report,
        } => run_client(net, link, fast, report).await,
        Commands::Sink { bind, port } => run_sink(bind, port).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_link() {
        let (addr, rssi) = parse_link("fd00::2=-62").unwrap();
        assert_eq!(addr, NodeAddress::local(2));
        assert_eq!(rssi, -62);

        assert!(parse_link("fd00::2").is_err());
        assert!(parse_link("fd00::2=loud").is_err());
    }

    #[test]
    fn test_client_flags() {
        let cli = Cli::try_parse_from([
            "wsn",
            "-vv",
            "client",
            "--fast",
            "--no-multicast",
            "--period",
            "2s",
            "--rssi",
            "-80",
            "--link",
            "fd00::1=-60",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Client {
                net,
                link,
                fast,
                report,
            } => {
                assert!(fast);
                assert!(!net.multicast().enabled);
                assert_eq!(report.period, Some(Duration::from_secs(2)));
                assert_eq!(link.rssi, -80);
                assert_eq!(link.links, vec![(NodeAddress::local(1), -60)]);

                let mut config = ClientConfig::fast();
                report.apply(&mut config);
                assert_eq!(config.report.period, Duration::from_secs(2));
                assert_eq!(config.report.payload, ClientConfig::fast().report.payload);
            }
            _ => panic!("expected client"),
        }
    }

    #[test]
    fn test_cluster_head_election_flags() {
        let cli = Cli::try_parse_from([
            "wsn",
            "cluster-head",
            "--value-min",
            "10",
            "--value-max",
            "20",
            "--draw-interval",
            "5m",
            "--broadcast-first",
            "75s",
        ])
        .unwrap();
        match cli.command {
            Commands::ClusterHead { fast, election, .. } => {
                assert!(!fast);
                let mut config = ClusterHeadConfig::default();
                election.apply(&mut config.election);
                assert_eq!(config.election.value_range(), 10..=20);
                assert_eq!(config.election.draw_interval, Duration::from_secs(300));
                assert_eq!(config.election.broadcast_first, Duration::from_secs(75));
                assert_eq!(config.election.draw_first, Duration::from_secs(60));
                config.validate().unwrap();
            }
            _ => panic!("expected cluster head"),
        }

        // Broadcast before the first draw is refused at startup
        let mut election = ElectionConfig::default();
        ElectionArgs {
            broadcast_first: Some(Duration::from_secs(30)),
            ..Default::default()
        }
        .apply(&mut election);
        assert!(election.validate().is_err());
    }

    #[test]
    fn test_sink_defaults() {
        let cli = Cli::try_parse_from(["wsn", "sink"]).unwrap();
        match cli.command {
            Commands::Sink { bind, port } => {
                assert_eq!(bind, IpAddr::V6(Ipv6Addr::UNSPECIFIED));
                assert_eq!(port, 7777);
            }
            _ => panic!("expected sink"),
        }
    }
}
