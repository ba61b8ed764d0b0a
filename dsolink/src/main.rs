use std::process::exit;
use std::time::Duration;

use clap::{crate_authors, crate_version, App, Arg, ArgMatches};
use env_logger::Env;
use tokio::runtime::Runtime;

use dsolink::{Discovery, Error, NumericScheme, ScpiResponse, Session, SessionConfig};

fn main() {
    let matches = App::new("Oscilloscope command line client")
        .author(crate_authors!())
        .version(crate_version!())
        .about("Send commands and queries to an oscilloscope and transfer waveforms and setups")
        .arg(
            Arg::with_name("config")
                .long("config")
                .short('c')
                .takes_value(true)
                .help("Session configuration file (JSON)."),
        )
        .arg(
            Arg::with_name("timeout")
                .long("timeout")
                .short('t')
                .takes_value(true)
                .help("Timeout in milliseconds, overrides the configuration."),
        )
        .arg(Arg::with_name("verbose").long("verbose").short('v').help("Log verbose output"))
        .arg(Arg::with_name("json").long("json").help("Print results as JSON"))
        .arg(
            Arg::with_name("resource")
                .required(true)
                .help("Resource string, e.g. `VXI11:192.168.1.10` or `TCPIP0::192.168.1.10::inst0::INSTR`"),
        )
        .subcommand(
            App::new("query")
                .about("Send a query and print the response")
                .arg(Arg::with_name("text").required(true)),
        )
        .subcommand(
            App::new("write")
                .about("Send a command")
                .arg(Arg::with_name("text").required(true)),
        )
        .subcommand(App::new("idn").about("Print the instrument identification"))
        .subcommand(App::new("errors").about("Drain the instrument's error queue"))
        .subcommand(
            App::new("save-panel")
                .about("Save the instrument setup to a file")
                .arg(Arg::with_name("file").required(true)),
        )
        .subcommand(
            App::new("load-panel")
                .about("Restore the instrument setup from a file")
                .arg(Arg::with_name("file").required(true)),
        )
        .subcommand(
            App::new("waveform")
                .about("Query a waveform and print its samples")
                .arg(Arg::with_name("text").required(true))
                .arg(
                    Arg::with_name("scheme")
                        .long("scheme")
                        .short('s')
                        .takes_value(true)
                        .default_value("int8")
                        .help("Sample format: ascii, int8, int16 or float32"),
                ),
        )
        .subcommand(App::new("clear").about("Send a device clear"))
        .get_matches();

    let verbose = matches.is_present("verbose");
    if verbose {
        env_logger::Builder::from_env(Env::default().default_filter_or("dsolink=debug")).init();
    } else {
        env_logger::init();
    }

    let mut config = match matches.value_of("config") {
        Some(path) => match SessionConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                println!("{}", err);
                exit(1);
            }
        },
        None => SessionConfig::default(),
    };
    if let Some(timeout) = matches.value_of("timeout") {
        match timeout.parse::<u64>() {
            Ok(timeout) => config = config.with_timeout(Duration::from_millis(timeout)),
            Err(_) => {
                println!("Cannot parse `{}` as a timeout in milliseconds.", timeout);
                exit(1);
            }
        }
    }

    let json = matches.is_present("json");
    let resource = matches.value_of("resource").unwrap_or_default().to_string();

    let rt = match Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            println!("Cannot start runtime: {}", err);
            exit(1);
        }
    };
    let ret = rt.block_on(async move {
        let session = Session::open(&Discovery::new(), &resource, config).await?;
        let ret = run(&session, &matches).await;
        close_session(&session, ret).await
    });

    match ret {
        Ok(resp) => print_response(&resp, json),
        Err(err) => {
            if json {
                println!("{}", serde_json::to_string(&err).unwrap_or_else(|_| err.to_string()));
            } else {
                println!("{}", err);
            }
            exit(1);
        }
    }
}

async fn run(session: &Session, matches: &ArgMatches) -> dsolink::Result<ScpiResponse> {
    match matches.subcommand() {
        Some(("query", args)) => {
            let text = args.value_of("text").unwrap_or_default();
            session.send_query(text).await.map(ScpiResponse::String)
        }
        Some(("write", args)) => {
            let text = args.value_of("text").unwrap_or_default();
            session.send_command(text).await.map(|_| ScpiResponse::Done)
        }
        Some(("idn", _)) => {
            let identity = session.identify().await?;
            Ok(ScpiResponse::String(identity.to_string()))
        }
        Some(("errors", _)) => {
            let poll = session.poll_errors().await?;
            let lines: Vec<String> = poll.records.iter().map(|x| x.to_string()).collect();
            Ok(ScpiResponse::String(lines.join("\n")))
        }
        Some(("save-panel", args)) => {
            let file = args.value_of("file").unwrap_or_default();
            let panel = session.get_panel().await?;
            tokio::fs::write(file, &panel).await.map_err(Error::argument)?;
            Ok(ScpiResponse::Done)
        }
        Some(("load-panel", args)) => {
            let file = args.value_of("file").unwrap_or_default();
            let panel = tokio::fs::read(file).await.map_err(Error::argument)?;
            session.set_panel(&panel).await?;
            Ok(ScpiResponse::Done)
        }
        Some(("waveform", args)) => {
            let text = args.value_of("text").unwrap_or_default();
            let scheme = args.value_of("scheme").unwrap_or("int8");
            let scheme = NumericScheme::from_name(scheme)
                .ok_or_else(|| Error::argument(anyhow::anyhow!("Unknown sample format: `{}`", scheme)))?;
            let samples = session.query_waveform(text, scheme).await?;
            let lines: Vec<String> = samples.iter().map(|x| x.to_string()).collect();
            Ok(ScpiResponse::String(lines.join("\n")))
        }
        Some(("clear", _)) => session.device_clear().await.map(|_| ScpiResponse::Done),
        _ => Err(Error::argument(anyhow::anyhow!("No command given, see --help"))),
    }
}

/// Close `session`, keeping the result of the command. A failed close is only logged.
async fn close_session(session: &Session, ret: dsolink::Result<ScpiResponse>) -> dsolink::Result<ScpiResponse> {
    if let Err(err) = session.close().await {
        log::warn!("Failed to close session {}: {}", session.id(), err);
    }
    log::debug!("Session {} done.", session.id());
    ret
}

fn print_response(resp: &ScpiResponse, json: bool) {
    if json {
        match serde_json::to_string(resp) {
            Ok(x) => println!("{}", x),
            Err(err) => println!("{}", err),
        }
        return;
    }
    match resp {
        ScpiResponse::Done => {}
        ScpiResponse::String(x) => println!("{}", x),
        ScpiResponse::Binary { data } => println!("<{} bytes>", data.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsolink::transport::MockInstrument;
    use dsolink::TransportKind;

    fn failing_close() -> (MockInstrument, Session) {
        let instrument = MockInstrument::new();
        instrument.fail_close(true);
        let transport = instrument.transport(TransportKind::Vicp, "VICP::127.0.0.1");
        let session = Session::with_transport(Box::new(transport), SessionConfig::default());
        (instrument, session)
    }

    #[tokio::test]
    async fn command_error_survives_close() {
        let (instrument, session) = failing_close();
        let ret = Err(Error::QueryUnterminated);
        match close_session(&session, ret).await {
            Err(Error::QueryUnterminated) => {}
            _ => panic!(),
        }
        assert!(instrument.is_closed());

        let (_instrument, session) = failing_close();
        let ret = close_session(&session, Ok(ScpiResponse::Done)).await;
        assert_eq!(ret.unwrap(), ScpiResponse::Done);
    }
}
