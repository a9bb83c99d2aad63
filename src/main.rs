use clap::{value_parser, Arg, Command};
use log::info;
use std::process;
use std::sync::Arc;
use tecnicofs::server::Server;

fn main() {
    env_logger::init();

    let args = Command::new("tecnicofs")
        .about("in-memory tree filesystem served over a unix datagram socket")
        .arg(
            Arg::new("numthreads")
                .help("size of the worker pool")
                .required(true)
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("socket")
                .help("path of the unix datagram socket to bind")
                .required(true),
        )
        .get_matches();

    let nworkers = *args.get_one::<usize>("numthreads").expect("required arg");
    let sock_path = args.get_one::<String>("socket").expect("required arg");

    if nworkers == 0 {
        eprintln!("tecnicofs: the worker pool needs at least one thread");
        process::exit(1);
    }

    let server = match Server::bind(sock_path) {
        Ok(server) => server,
        Err(err) => {
            eprintln!("tecnicofs: cannot bind {sock_path}: {err}");
            process::exit(1);
        }
    };

    info!("serving on {sock_path} with {nworkers} workers");
    if let Err(err) = Arc::new(server).run(nworkers) {
        eprintln!("tecnicofs: {err}");
        process::exit(1);
    }
}
