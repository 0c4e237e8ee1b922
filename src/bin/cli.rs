use anyhow::{bail, Context};
use castlane::credentials::UiCreds;
use castlane::testing::{SyntheticBackend, SyntheticTransport};
use castlane::{
    CredentialField, CredentialSet, CredentialStore, FileStore, MediaKind, MemoryStore,
    PublisherState, Role, SessionConfig, SessionCoordinator, SessionSnapshot, SourceType,
    SubscriberState,
};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn main() -> anyhow::Result<()> {
    castlane::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: castlane-cli <demo|config|creds|save-creds> [args]");
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "demo" => cmd_demo(&args),
        "config" => cmd_config(&args),
        "creds" => cmd_creds(&args),
        "save-creds" => cmd_save_creds(&args),
        _ => {
            eprintln!("Unknown command: {}", command);
            std::process::exit(1);
        }
    }
}

fn load_config(args: &[String]) -> anyhow::Result<SessionConfig> {
    let path = args
        .get(2)
        .filter(|arg| !arg.starts_with("--"))
        .map(PathBuf::from)
        .unwrap_or_else(SessionConfig::default_path);
    let config = SessionConfig::load_from_file(&path)
        .with_context(|| format!("loading {}", path.display()))?;
    Ok(config)
}

fn open_credentials(config: &SessionConfig) -> anyhow::Result<CredentialStore> {
    let store = FileStore::open(&config.session.store_path)
        .with_context(|| format!("opening store {}", config.session.store_path))?;
    Ok(CredentialStore::new(
        config.credentials.clone(),
        Arc::new(store),
    ))
}

fn cmd_config(args: &[String]) -> anyhow::Result<()> {
    let config = load_config(args)?;
    if args.contains(&"--json".to_string()) {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        print!("{}", toml::to_string_pretty(&config)?);
    }
    Ok(())
}

fn cmd_creds(args: &[String]) -> anyhow::Result<()> {
    let source_type: SourceType = match args.get(2) {
        Some(name) => name.parse()?,
        None => SourceType::Current,
    };
    if source_type == SourceType::Ui {
        bail!("the ui source only exists inside a running app");
    }

    let config = SessionConfig::load_or_default();
    let credentials = open_credentials(&config)?;
    let source = credentials.source(source_type);
    let set = CredentialSet::from_source(source.as_ref());
    println!("[{}] {}", source_type.as_str(), set.summary());
    Ok(())
}

fn cmd_save_creds(args: &[String]) -> anyhow::Result<()> {
    if args.len() < 3 {
        eprintln!("Usage: castlane-cli save-creds <field>=<value>...");
        std::process::exit(1);
    }

    let config = SessionConfig::load_or_default();
    let credentials = open_credentials(&config)?;
    let edits = UiCreds::from_source(&credentials.current_source());
    for arg in &args[2..] {
        let Some((field, value)) = arg.split_once('=') else {
            bail!("expected <field>=<value>, got '{}'", arg);
        };
        let field: CredentialField = field.parse()?;
        edits.set(field, value);
    }

    credentials.apply(&edits, true)?;
    println!("Saved: {}", credentials.applied().summary());
    Ok(())
}

fn cmd_demo(args: &[String]) -> anyhow::Result<()> {
    let json = args.contains(&"--json".to_string());

    let mut config = SessionConfig::default();
    config.credentials.account_id = "demo-account".to_string();
    config.credentials.pub_token = "demo-publish-token".to_string();
    config.credentials.sub_token = "demo-subscribe-token".to_string();

    let mut session = SessionCoordinator::new(
        config,
        Arc::new(SyntheticBackend::new()),
        Arc::new(SyntheticTransport::new()),
        Arc::new(MemoryStore::new()),
    )?;
    let print = |step: &str, snapshot: &SessionSnapshot| -> anyhow::Result<()> {
        if json {
            println!(
                "{}",
                serde_json::json!({ "step": step, "snapshot": snapshot })
            );
        } else {
            println!(
                "{:<18} capture={:?} publisher={:?} subscriber={:?} media={:?}",
                step, snapshot.capture, snapshot.publisher, snapshot.subscriber, snapshot.media
            );
        }
        Ok(())
    };

    session.start_capture().wait_blocking()?;
    print("capture", &session.snapshot())?;

    session.connect_publisher().wait_blocking()?;
    let snapshot = wait_until(&session, |s| s.publisher == PublisherState::Publishing)?;
    print("publish", &snapshot)?;

    let camera = session.switch_video_source(true).wait_blocking()?;
    let snapshot = wait_until(&session, |s| s.publisher == PublisherState::Publishing)?;
    print(&format!("switch camera {}", camera), &snapshot)?;

    session.toggle_media(Role::Publisher, MediaKind::Audio).wait_blocking()?;
    print("mute audio", &session.snapshot())?;

    session.connect_subscriber().wait_blocking()?;
    let snapshot = wait_until(&session, |s| {
        s.subscriber == SubscriberState::Subscribing && s.media.sub_video_enabled
    })?;
    print("subscribe", &snapshot)?;

    session.stop_subscribe().wait_blocking()?;
    session.stop_publish_and_capture().wait_blocking()?;
    print("stop", &session.snapshot())?;

    session.shutdown();
    Ok(())
}

/// Poll snapshots until `done` holds; events arrive as separate lane tasks.
fn wait_until<F>(session: &SessionCoordinator, done: F) -> anyhow::Result<SessionSnapshot>
where
    F: Fn(&SessionSnapshot) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let snapshot = session.snapshot();
        if done(&snapshot) {
            return Ok(snapshot);
        }
        if Instant::now() > deadline {
            bail!("timed out waiting for session, last snapshot: {:?}", snapshot);
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}
