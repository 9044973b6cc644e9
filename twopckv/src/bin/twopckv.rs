use std::{fs, path::PathBuf, sync::Arc, time::Duration};

use labrpc::{
    anyhow::{anyhow, bail, Result},
    log::info,
    serde_json,
    tokio::{
        self,
        io::{self, AsyncBufReadExt, BufReader},
    },
};
use structopt::StructOpt;
use twopc::{
    cluster::{self, replica_id, Cluster},
    Config, LocalStore, MemStore, Participant,
};
use twopckv::{Client, RocksStore};

#[derive(StructOpt, Debug)]
#[structopt(name = env!("CARGO_PKG_NAME"), version = env!("CARGO_PKG_VERSION"), author = env!("CARGO_PKG_AUTHORS"))]
/// Run a coordinator and its replicas in one process and talk to it from stdin.
struct Opt {
    /// Number of replicas to start
    #[structopt(short, long, default_value = "3")]
    replicas: usize,

    /// Timeout in milliseconds for every call from the coordinator to a replica
    #[structopt(short, long)]
    timeout_ms: Option<u64>,

    /// Directory holding one RocksDB database per replica, in memory if absent
    #[structopt(long, parse(from_os_str))]
    data_dir: Option<PathBuf>,

    /// JSON file with coordinator settings
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Log everything
    #[structopt(long)]
    debug: bool,
}

#[derive(Debug, PartialEq)]
enum Command {
    Put(String, String),
    Del(String),
    Get(String),
    Kill(usize),
    Revive(usize),
    Slow(usize, u64),
    Members,
    Help,
    Exit,
}

const HELP: &str = "\
put <key> <value>   insert a key value pair
del <key>           delete a key
get <key>           lookup using a key
kill <i>            make replica i unreachable
revive <i>          reconnect replica i and register it again
slow <i> <ms>       delay traffic to replica i (0 clears)
members             list replicas the coordinator knows
exit";

fn parse(line: &str) -> Result<Command> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let index = |s: &str| -> Result<usize> {
        s.parse()
            .map_err(|_| anyhow!("cannot parse {} as a replica index", s))
    };
    let cmd = match words.as_slice() {
        ["put", k, v] => Command::Put(k.to_string(), v.to_string()),
        ["del", k] => Command::Del(k.to_string()),
        ["get", k] => Command::Get(k.to_string()),
        ["kill", i] => Command::Kill(index(*i)?),
        ["revive", i] => Command::Revive(index(*i)?),
        ["slow", i, ms] => Command::Slow(
            index(*i)?,
            ms.parse()
                .map_err(|_| anyhow!("cannot parse {} as milliseconds", ms))?,
        ),
        ["members"] => Command::Members,
        ["help"] => Command::Help,
        ["exit"] | ["quit"] => Command::Exit,
        _ => bail!("input mismatch: {}", line.trim()),
    };
    Ok(cmd)
}

async fn serve<S: LocalStore>(c: Cluster<S>, replicas: usize) -> Result<()> {
    let client = Client::new(c.coordinator.clone());
    let check = |i: usize| -> Result<usize> {
        if i < replicas {
            Ok(i)
        } else {
            Err(anyhow!("no replica {}, there are {}", i, replicas))
        }
    };

    println!("{}", HELP);
    let mut lines = BufReader::new(io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let cmd = match parse(&line) {
            Ok(cmd) => cmd,
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };
        match cmd {
            Command::Put(k, v) => {
                if !client.put(&k, &v).await? {
                    eprintln!("transaction did not go through, try again");
                }
            }
            Command::Del(k) => {
                if !client.del(&k).await? {
                    eprintln!("transaction did not go through, try again");
                }
            }
            Command::Get(k) => println!("{}", client.get(&k).await?),
            Command::Kill(i) => match check(i) {
                Ok(i) => c.kill(i),
                Err(e) => eprintln!("{}", e),
            },
            Command::Revive(i) => match check(i) {
                Ok(i) => {
                    c.revive(i);
                    c.rejoin(i).await?;
                }
                Err(e) => eprintln!("{}", e),
            },
            Command::Slow(i, ms) => match check(i) {
                Ok(i) => {
                    let delay = Some(Duration::from_millis(ms)).filter(|d| !d.is_zero());
                    c.net.set_delay(&replica_id(i), delay);
                }
                Err(e) => eprintln!("{}", e),
            },
            Command::Members => println!("{}", c.members().join(" ")),
            Command::Help => println!("{}", HELP),
            Command::Exit => break,
        }
    }
    info!("exiting");
    Ok(())
}

fn load_config(opt: &Opt) -> Result<Config> {
    let mut config = match &opt.config {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => Config::default(),
    };
    if let Some(ms) = opt.timeout_ms {
        config.rpc_timeout = Duration::from_millis(ms);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::from_args();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if opt.debug { "trace" } else { "warn" }),
    )
    .init();

    let config = load_config(&opt)?;
    info!("starting {} replicas with {:?}", opt.replicas, config);

    match &opt.data_dir {
        Some(dir) => {
            let mut participants = Vec::new();
            for i in 0..opt.replicas {
                let path = dir.join(replica_id(i));
                info!("using {} as the database of {}", path.display(), replica_id(i));
                participants.push(Participant::new(Arc::new(RocksStore::new(path)?)));
            }
            serve(cluster::start(config, participants).await?, opt.replicas).await
        }
        None => {
            let participants = (0..opt.replicas)
                .map(|_| Participant::new(Arc::new(MemStore::new())))
                .collect();
            serve(cluster::start(config, participants).await?, opt.replicas).await
        }
    }
}
