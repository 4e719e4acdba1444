use clap::Parser;
use std::process;
use std::time::Duration;
use tokio::io::BufReader;
use tracing::Instrument;
use tracing_subscriber::EnvFilter;

use bulk_resolver::pipeline::{Pipeline, Settings};
use bulk_resolver::transport::{Family, SocketKind, Transport};
use dns_wire::protocol::types::RecordType;

/// Burst size used when `-s` is out of range.
const SHOTS_FALLBACK: usize = 10;

/// Delay used when `-S` is out of range.
const DELAY_FALLBACK_USEC: u64 = 10;

const LIMIT: i64 = 0x0010_0000;

// the doc comments for this struct turn into the CLI help text
#[derive(Debug, Parser)]
#[clap(group(clap::ArgGroup::new("family").required(true).args(["inet", "inet6"])))]
/// Mass DNS resolver
///
/// Reads whitespace-separated hostnames from stdin, sends queries for
/// them in bursts to one or more recursive nameservers, and prints
/// every A, AAAA, and CNAME record in the replies, one per line.
/// Names which do not exist are printed as NXDOMAIN.
///
/// Queries are never retried: a name which gets no reply before the
/// input runs out and the drain timeout passes is silently dropped.
struct Args {
    /// Talk to the nameservers over IPv4
    #[clap(short = '4', action(clap::ArgAction::SetTrue))]
    inet: bool,

    /// Talk to the nameservers over IPv6
    #[clap(short = '6', action(clap::ArgAction::SetTrue))]
    inet6: bool,

    /// IP or hostname of a recursive nameserver, can be specified more
    /// than once
    #[clap(short = 'N', long = "nameserver", required = true)]
    nameservers: Vec<String>,

    /// Port the nameservers listen on
    #[clap(short, long, default_value_t = 53)]
    port: u16,

    /// Ask for AAAA records rather than A
    #[clap(short = 'Q', action(clap::ArgAction::SetTrue))]
    aaaa: bool,

    /// Only print addresses: no CNAMEs, no NXDOMAINs
    #[clap(short = 'A', action(clap::ArgAction::SetTrue))]
    address_only: bool,

    /// How many queries to send in a row before reading replies (low
    /// values are fine)
    #[clap(short, long, default_value_t = 4, allow_negative_numbers = true)]
    shots: i64,

    /// Microseconds to sleep after each send, so as not to flood the
    /// nameservers
    #[clap(short = 'S', long = "sleep", default_value_t = 1500, allow_negative_numbers = true)]
    usec: i64,

    /// Use a single TCP session to the first nameserver instead of UDP
    #[clap(short = 'T', long, action(clap::ArgAction::SetTrue))]
    tcp: bool,

    /// Seconds to keep waiting for replies once stdin is exhausted
    #[clap(long, default_value_t = 2, env = "FERNMELDER_DRAIN_TIMEOUT")]
    drain_timeout: u64,
}

fn clamp_shots(shots: i64) -> usize {
    if (1..=LIMIT).contains(&shots) {
        usize::try_from(shots).unwrap_or(SHOTS_FALLBACK)
    } else {
        SHOTS_FALLBACK
    }
}

fn clamp_delay(usec: i64) -> u64 {
    if (10..=LIMIT).contains(&usec) {
        u64::try_from(usec).unwrap_or(DELAY_FALLBACK_USEC)
    } else {
        DELAY_FALLBACK_USEC
    }
}

fn banner(args: &Args, shots: usize, usec: u64) -> String {
    let mut out = format!(
        "\n; <<>> fernmelder {}.{} <<>> -s {shots} -S {usec}",
        env!("CARGO_PKG_VERSION_MAJOR"),
        env!("CARGO_PKG_VERSION_MINOR"),
    );
    for nameserver in &args.nameservers {
        out.push_str(" -N ");
        out.push_str(nameserver);
    }
    if args.aaaa {
        out.push_str(" -Q");
    }
    if args.address_only {
        out.push_str(" -A");
    }
    out.push_str("\n;\n");
    out
}

/// Log to stderr, so stdout only carries results.  `RUST_LOG` picks
/// the filter (default `warn`), `RUST_LOG_FORMAT=json` switches to
/// one JSON object per line.
fn init_logging() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr);

    match std::env::var("RUST_LOG_FORMAT").as_deref() {
        Ok("json") => subscriber.json().init(),
        _ => subscriber.init(),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    init_logging();

    let shots = clamp_shots(args.shots);
    let usec = clamp_delay(args.usec);

    let family = if args.inet6 {
        Family::Inet6
    } else {
        Family::Inet
    };
    let kind = if args.tcp {
        SocketKind::Stream
    } else {
        SocketKind::Datagram
    };

    let mut transport = Transport::new(family, kind);
    for nameserver in &args.nameservers {
        if let Err(error) = transport.add_nameserver(nameserver, args.port).await {
            tracing::error!(%nameserver, %error, "could not add nameserver");
            process::exit(2);
        }
    }

    if let Err(error) = transport.rebind() {
        tracing::error!(%error, "could not set up socket");
        process::exit(1);
    }

    print!("{}", banner(&args, shots, usec));

    let settings = Settings {
        qtype: if args.aaaa {
            RecordType::AAAA
        } else {
            RecordType::A
        },
        shots,
        delay: Duration::from_micros(usec),
        drain_timeout: Duration::from_secs(args.drain_timeout),
        address_only: args.address_only,
    };

    let pipeline = Pipeline::new(transport, settings);
    match pipeline
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .instrument(tracing::error_span!("pipeline", shots, usec, tcp = args.tcp))
        .await
    {
        Ok(metrics) => tracing::info!(
            built = metrics.queries_built,
            sent = metrics.queries_sent,
            dropped = metrics.queries_dropped,
            accepted = metrics.replies_accepted,
            uncorrelated = metrics.replies_uncorrelated,
            malformed = metrics.replies_malformed,
            receive_errors = metrics.receive_errors,
            written = metrics.records_written,
            unanswered = metrics.queries_unanswered,
            "done"
        ),
        Err(error) => {
            tracing::error!(%error, "i/o error");
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn args_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn family_is_required() {
        assert!(Args::try_parse_from(["fernmelder", "-N", "127.0.0.1"]).is_err());
    }

    #[test]
    fn families_conflict() {
        assert!(Args::try_parse_from(["fernmelder", "-4", "-6", "-N", "127.0.0.1"]).is_err());
    }

    #[test]
    fn nameserver_is_required() {
        assert!(Args::try_parse_from(["fernmelder", "-4"]).is_err());
    }

    #[test]
    fn family_may_follow_nameservers() {
        let args =
            Args::try_parse_from(["fernmelder", "-N", "a.example", "-N", "b.example", "-6"])
                .unwrap();

        assert!(args.inet6);
        assert_eq!(vec!["a.example", "b.example"], args.nameservers);
    }

    #[test]
    fn shots_are_clamped() {
        assert_eq!(4, clamp_shots(4));
        assert_eq!(1, clamp_shots(1));
        assert_eq!(0x0010_0000, clamp_shots(0x0010_0000));
        assert_eq!(10, clamp_shots(0));
        assert_eq!(10, clamp_shots(-3));
        assert_eq!(10, clamp_shots(0x0010_0001));
    }

    #[test]
    fn delay_is_clamped() {
        assert_eq!(1500, clamp_delay(1500));
        assert_eq!(10, clamp_delay(9));
        assert_eq!(10, clamp_delay(-1));
        assert_eq!(10, clamp_delay(0x0010_0001));
        assert_eq!(0x0010_0000, clamp_delay(0x0010_0000));
    }

    #[test]
    fn negative_shots_parse() {
        let args = Args::try_parse_from(["fernmelder", "-4", "-N", "ns", "-s", "-5"]).unwrap();

        assert_eq!(-5, args.shots);
    }

    #[test]
    fn banner_lists_options() {
        let args = Args::try_parse_from([
            "fernmelder", "-4", "-N", "192.0.2.1", "-N", "ns.example", "-Q", "-A",
        ])
        .unwrap();

        assert_eq!(
            "\n; <<>> fernmelder 0.3 <<>> -s 4 -S 1500 -N 192.0.2.1 -N ns.example -Q -A\n;\n",
            banner(&args, 4, 1500)
        );
    }
}
