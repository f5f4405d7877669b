use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate, NaiveTime, Utc};
use clap::{Args, Parser, Subcommand};
use rollcall_api::{ApiClient, ModelStatus, RegistrationOutcome};
use rollcall_core::{dashboard_stats, report, search_sessions};
use rollcall_core::{CameraMode, Person, PersonId, PersonInput, SessionId, SessionInput, TagId, TagInput};
use rollcall_engine::{
    AttendanceState, Backend, CameraState, CycleOutcome, Level, LoopPhase, Notifier,
    RecognitionLoop, SessionView, TracingNotifier,
};
use rollcall_hw::V4lWebcam;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "rollcall", version, about = "Face-recognition attendance client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Roster size, session counts and recent attendance
    Overview,
    /// Manage the roster
    #[command(subcommand)]
    People(PeopleCommand),
    /// Manage tags
    #[command(subcommand)]
    Tags(TagsCommand),
    /// Manage attendance sessions
    #[command(subcommand)]
    Sessions(SessionsCommand),
    /// Attendance report over a date range
    Report {
        /// First day (YYYY-MM-DD); the backend defaults to 30 days ago
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day (YYYY-MM-DD); the backend defaults to today
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Export as CSV instead of printing a table
        #[arg(long)]
        csv: bool,
        /// CSV destination; `-` for stdout
        #[arg(short, long, requires = "csv")]
        output: Option<PathBuf>,
    },
    /// Networked camera configuration and connectivity
    #[command(subcommand)]
    Camera(CameraCommand),
    /// Face registration and model training
    #[command(subcommand)]
    Face(FaceCommand),
    /// Live recognition against a session
    Recognize {
        session: SessionId,
        #[command(flatten)]
        source: SourceArgs,
        /// Take a single capture instead of running the loop
        #[arg(long)]
        once: bool,
        /// Finish the session when recognition stops
        #[arg(long, conflicts_with = "once")]
        finish: bool,
    },
    /// List local V4L2 capture devices
    Devices,
}

#[derive(Args)]
struct SourceArgs {
    /// Capture through the ESP32-CAM at this IP instead of the local webcam
    #[arg(long, value_name = "IP")]
    esp32: Option<String>,
}

#[derive(Subcommand)]
enum PeopleCommand {
    /// List people, optionally filtered
    List {
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Show one person and their face images
    Show { id: PersonId },
    /// Add a person
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// Tag to attach (repeatable)
        #[arg(long = "tag")]
        tags: Vec<TagId>,
    },
    /// Replace a person's name, email and tags
    Update {
        id: PersonId,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long = "tag")]
        tags: Vec<TagId>,
    },
    /// Delete a person
    Remove { id: PersonId },
    /// People carrying a tag
    ByTag { tag: TagId },
}

#[derive(Subcommand)]
enum TagsCommand {
    List {
        #[arg(short, long)]
        search: Option<String>,
    },
    Show {
        id: TagId,
    },
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    Update {
        id: TagId,
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a tag; people keep their other tags
    Remove {
        id: TagId,
    },
    /// People carrying this tag
    Members {
        id: TagId,
    },
}

#[derive(Subcommand)]
enum SessionsCommand {
    List {
        /// Only sessions whose name or description contains this text
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Progress, recognized people and who is still missing, by tag
    Show { id: SessionId },
    /// Create a session. The target list cannot be changed afterwards.
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Session day (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Local start time, HH:MM (default: now)
        #[arg(long, value_parser = parse_time)]
        start: Option<NaiveTime>,
        /// Target person (repeatable)
        #[arg(long = "person")]
        people: Vec<PersonId>,
        /// Add everyone carrying this tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<TagId>,
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Rename or re-describe a session
    Update {
        id: SessionId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    Remove { id: SessionId },
    /// Mark one person present by hand
    Mark { session: SessionId, person: PersonId },
    /// Finish a session. Absent targets are recorded by the backend.
    Finish { id: SessionId },
}

#[derive(Subcommand)]
enum CameraCommand {
    /// Cameras the backend has connected to before
    Configs,
    /// Probe an ESP32-CAM through the backend
    Test {
        ip: String,
        /// Drop any previous connection first and wait for it to settle
        #[arg(long)]
        reconnect: bool,
    },
    /// Print the MJPEG stream URL of a reachable ESP32-CAM
    Stream { ip: String },
}

#[derive(Subcommand)]
enum FaceCommand {
    /// Capture and register a face for a person
    Register {
        person: PersonId,
        #[command(flatten)]
        source: SourceArgs,
    },
    /// List a person's registered face images
    Images { person: PersonId },
    /// Delete one face image
    Delete { image: i64 },
    /// Retrain the recognition model
    Train,
}

/// Prints notifications for the operator on stderr.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, level: Level, message: &str) {
        tracing::debug!(%level, "{message}");
        let tag = match level {
            Level::Success => "ok",
            Level::Info => "info",
            Level::Warning => "warn",
            Level::Error => "error",
        };
        eprintln!("[{tag}] {message}");
    }
}

/// An error the notifier has already shown to the operator.
#[derive(Error, Debug)]
#[error("operation failed")]
struct Reported;

trait Notified<T> {
    /// Swap an engine error for [`Reported`] so it is not printed twice.
    fn notified(self) -> Result<T>;
}

impl<T, E: std::fmt::Display> Notified<T> for std::result::Result<T, E> {
    fn notified(self) -> Result<T> {
        self.map_err(|e| {
            tracing::debug!(error = %e, "operation failed");
            Reported.into()
        })
    }
}

struct App {
    config: Config,
    api: Arc<ApiClient>,
    notifier: Arc<dyn Notifier>,
}

impl App {
    fn backend(&self) -> Arc<dyn Backend> {
        self.api.clone()
    }

    fn attendance(&self) -> AttendanceState {
        AttendanceState::new(self.backend(), self.notifier.clone())
    }

    /// Camera state with the requested source selected and ready to capture.
    async fn camera(&self, esp32: Option<&str>) -> Result<Arc<CameraState>> {
        let camera = Arc::new(CameraState::new(
            self.backend(),
            self.notifier.clone(),
            self.config.camera_settings(),
        ));

        match esp32 {
            Some(ip) => {
                if !camera.initialize(CameraMode::Esp32, Some(ip)).await {
                    return Err(Reported.into());
                }
            }
            None => {
                let device = self.config.webcam_device.clone();
                let (width, height) = (self.config.webcam_width, self.config.webcam_height);
                let warmup = self.config.warmup_frames;
                let webcam = tokio::task::spawn_blocking(move || {
                    V4lWebcam::open(&device, width, height).map(|w| w.with_warmup_frames(warmup))
                })
                .await?
                .with_context(|| format!("failed to open webcam {}", self.config.webcam_device))?;
                camera.attach_webcam(Arc::new(webcam)).await;
                camera.initialize(CameraMode::Webcam, None).await;
            }
        }
        Ok(camera)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Off a terminal, notifications go through the log instead of bare lines.
    let interactive = std::io::stderr().is_terminal();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if interactive { "error" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    tracing::debug!(?config, "configuration loaded");

    let api = ApiClient::new(&config.api_url, config.request_timeout())?;
    let notifier: Arc<dyn Notifier> = if interactive {
        Arc::new(ConsoleNotifier)
    } else {
        Arc::new(TracingNotifier)
    };
    let app = App {
        config,
        api: Arc::new(api),
        notifier,
    };

    match run(&app, cli.command).await {
        Err(e) if e.is::<Reported>() => std::process::exit(1),
        res => res,
    }
}

async fn run(app: &App, command: Commands) -> Result<()> {
    match command {
        Commands::Overview => overview(app).await,
        Commands::People(cmd) => people(app, cmd).await,
        Commands::Tags(cmd) => tags(app, cmd).await,
        Commands::Sessions(cmd) => sessions(app, cmd).await,
        Commands::Report {
            from,
            to,
            csv,
            output,
        } => show_report(app, from, to, csv, output).await,
        Commands::Camera(cmd) => camera(app, cmd).await,
        Commands::Face(cmd) => face(app, cmd).await,
        Commands::Recognize {
            session,
            source,
            once,
            finish,
        } => recognize(app, session, source.esp32, once, finish).await,
        Commands::Devices => {
            let devices = tokio::task::spawn_blocking(V4lWebcam::list_devices).await?;
            if devices.is_empty() {
                println!("No capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
            Ok(())
        }
    }
}

async fn people(app: &App, cmd: PeopleCommand) -> Result<()> {
    match cmd {
        PeopleCommand::List { search } => print_people(&app.api.list_people(search.as_deref()).await?),
        PeopleCommand::Show { id } => {
            let faces = app.api.person_face_images(id).await?;
            print_people(std::slice::from_ref(&faces.user));
            println!("{} face image(s)", faces.images.len());
            for image in &faces.images {
                let primary = if image.is_primary { " (primary)" } else { "" };
                println!("  #{:<5} {}{primary}", image.id, image.image_path);
            }
        }
        PeopleCommand::Add { name, email, tags } => {
            let person = app
                .api
                .create_person(&PersonInput {
                    name,
                    email,
                    tag_ids: tags,
                    tag: None,
                })
                .await?;
            println!("Created person #{} {}", person.id, person.name);
        }
        PeopleCommand::Update {
            id,
            name,
            email,
            tags,
        } => {
            let person = app
                .api
                .update_person(
                    id,
                    &PersonInput {
                        name,
                        email,
                        tag_ids: tags,
                        tag: None,
                    },
                )
                .await?;
            println!("Updated person #{} {}", person.id, person.name);
        }
        PeopleCommand::Remove { id } => {
            app.api.delete_person(id).await?;
            println!("Deleted person #{id}");
        }
        PeopleCommand::ByTag { tag } => print_people(&app.api.people_by_tag(tag).await?),
    }
    Ok(())
}

async fn tags(app: &App, cmd: TagsCommand) -> Result<()> {
    match cmd {
        TagsCommand::List { search } => {
            for tag in app.api.list_tags(search.as_deref()).await? {
                println!("#{:<5} {:<20} {}", tag.id, tag.name, tag.description.unwrap_or_default());
            }
        }
        TagsCommand::Show { id } => {
            let tag = app.api.get_tag(id).await?;
            println!("#{} {}", tag.id, tag.name);
            if let Some(description) = tag.description {
                println!("{description}");
            }
        }
        TagsCommand::Add { name, description } => {
            let tag = app.api.create_tag(&TagInput { name, description }).await?;
            println!("Created tag #{} {}", tag.id, tag.name);
        }
        TagsCommand::Update {
            id,
            name,
            description,
        } => {
            let tag = app
                .api
                .update_tag(id, &TagInput { name, description })
                .await?;
            println!("Updated tag #{} {}", tag.id, tag.name);
        }
        TagsCommand::Remove { id } => {
            app.api.delete_tag(id).await?;
            println!("Deleted tag #{id}");
        }
        TagsCommand::Members { id } => print_people(&app.api.tag_members(id).await?),
    }
    Ok(())
}

async fn overview(app: &App) -> Result<()> {
    let (people, sessions) = tokio::try_join!(app.api.list_people(None), app.api.list_sessions())?;
    let stats = dashboard_stats(people.len(), &sessions, Local::now().date_naive());
    println!("People:           {}", stats.total_people);
    println!("Active sessions:  {}", stats.active_sessions);
    println!("Total sessions:   {}", stats.total_sessions);
    println!("Present (last {} days): {}", rollcall_core::overview::RECENT_DAYS, stats.recent_present);
    Ok(())
}

async fn sessions(app: &App, cmd: SessionsCommand) -> Result<()> {
    match cmd {
        SessionsCommand::List { search } => {
            let all = app.api.list_sessions().await?;
            let found = search_sessions(&all, search.as_deref().unwrap_or(""));
            if found.is_empty() && !all.is_empty() {
                println!("No sessions match");
            }
            for s in found {
                let stats = s.stats();
                let status = if s.is_finished { "finished" } else { "active" };
                println!(
                    "{}  {}  {:<8} {:>3}/{:<3} {}",
                    s.id, s.session_date, status, stats.present, stats.total, s.name
                );
            }
        }
        SessionsCommand::Show { id } => {
            let attendance = app.attendance();
            attendance.load_session(id).await.notified()?;
            if let Some(view) = attendance.view().await {
                print_view(&view);
            }
        }
        SessionsCommand::Create {
            name,
            description,
            date,
            start,
            people,
            tags,
            source,
        } => {
            let targets = collect_targets(app, people, &tags).await?;
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let time = start.unwrap_or_else(|| Local::now().time());
            let start_time = date
                .and_time(time)
                .and_local_timezone(Local)
                .earliest()
                .context("start time does not exist in the local timezone")?
                .with_timezone(&Utc);

            let input = SessionInput {
                name,
                description,
                session_date: date,
                start_time,
                end_time: None,
                camera_mode: if source.esp32.is_some() {
                    CameraMode::Esp32
                } else {
                    CameraMode::Webcam
                },
                esp32_ip: source.esp32,
                target_users: targets,
            };
            let session = app.attendance().start_session(&input).await.notified()?;
            println!(
                "Created session {} \"{}\" with {} target(s)",
                session.id,
                session.name,
                session.target_users.len()
            );
        }
        SessionsCommand::Update {
            id,
            name,
            description,
        } => {
            let current = app.api.get_session(id).await?;
            let input = SessionInput {
                name: name.unwrap_or(current.name),
                description: description.or(current.description),
                session_date: current.session_date,
                start_time: current.start_time,
                end_time: current.end_time,
                camera_mode: current.camera_mode,
                esp32_ip: current.esp32_ip,
                target_users: Vec::new(),
            };
            let session = app.api.update_session(id, &input).await?;
            println!("Updated session {} \"{}\"", session.id, session.name);
        }
        SessionsCommand::Remove { id } => {
            app.api.delete_session(id).await?;
            println!("Deleted session {id}");
        }
        SessionsCommand::Mark { session, person } => {
            let attendance = app.attendance();
            attendance.load_session(session).await.notified()?;
            if attendance.mark_attendance(person).await.notified()? {
                println!("Marked #{person} present");
            } else {
                println!("#{person} was already marked present");
            }
        }
        SessionsCommand::Finish { id } => {
            let attendance = app.attendance();
            attendance.load_session(id).await.notified()?;
            let session = attendance.finish_session().await.notified()?;
            let stats = session.stats();
            println!(
                "Finished \"{}\": {}/{} present",
                session.name, stats.present, stats.total
            );
        }
    }
    Ok(())
}

/// Explicit people first, then every member of each tag, without repeats.
async fn collect_targets(app: &App, people: Vec<PersonId>, tags: &[TagId]) -> Result<Vec<PersonId>> {
    let mut targets: Vec<PersonId> = Vec::new();
    for id in people {
        if !targets.contains(&id) {
            targets.push(id);
        }
    }
    for tag in tags {
        for person in app.api.people_by_tag(*tag).await? {
            if !targets.contains(&person.id) {
                targets.push(person.id);
            }
        }
    }
    if targets.is_empty() {
        bail!("a session needs at least one target; pass --person or --tag");
    }
    Ok(targets)
}

async fn show_report(
    app: &App,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    csv: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let data = app.api.attendance_report(from, to).await?;

    if csv {
        let path = output
            .unwrap_or_else(|| PathBuf::from(report::default_export_name(Local::now().date_naive())));
        if path.as_os_str() == "-" {
            report::write_csv(&data.sessions, std::io::stdout().lock())?;
        } else {
            let file = std::fs::File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            report::write_csv(&data.sessions, file)?;
            eprintln!("Exported {} session(s) to {}", data.sessions.len(), path.display());
        }
        return Ok(());
    }

    println!("Report {} to {}", data.start_date, data.end_date);
    if data.sessions.is_empty() {
        println!("No sessions in this range");
        return Ok(());
    }
    for s in &data.sessions {
        println!(
            "{}  {:<8} {:>3} present {:>3} absent {:>5.1}%  {}",
            s.date.format("%m/%d/%Y"),
            s.status(),
            s.present_users,
            s.absent_users,
            s.rate(),
            s.name
        );
    }
    let overall = data.overall();
    println!(
        "{} session(s), {} present of {} ({}%)",
        overall.sessions, overall.total_present, overall.total_users, overall.average_rate
    );
    Ok(())
}

async fn camera(app: &App, cmd: CameraCommand) -> Result<()> {
    match cmd {
        CameraCommand::Configs => {
            for c in app.api.camera_configs().await? {
                let last = c
                    .last_connected
                    .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".into());
                let state = if c.is_active { "active" } else { "inactive" };
                println!("{:<15} {:<8} last seen {last}  {}", c.ip_address, state, c.name);
            }
        }
        CameraCommand::Test { ip, reconnect } => {
            let camera = CameraState::new(app.backend(), app.notifier.clone(), app.config.camera_settings());
            let ok = if reconnect {
                camera.reconnect(&ip).await
            } else {
                camera.test_connection(&ip).await
            };
            if !ok {
                return Err(Reported.into());
            }
        }
        CameraCommand::Stream { ip } => {
            let camera = app.camera(Some(&ip)).await?;
            println!("{}", camera.start_stream().await.notified()?);
        }
    }
    Ok(())
}

async fn face(app: &App, cmd: FaceCommand) -> Result<()> {
    match cmd {
        FaceCommand::Register { person, source } => {
            let camera = app.camera(source.esp32.as_deref()).await?;
            let image = camera.capture_image().await.notified()?;
            match app.api.register_face(person, &image).await? {
                RegistrationOutcome::Registered(face) => {
                    println!("Registered face image #{} ({})", face.id, face.path);
                }
                RegistrationOutcome::NoFaceDetected { message } => {
                    bail!("no face detected: {message}");
                }
                RegistrationOutcome::DuplicateFace {
                    existing,
                    confidence,
                    ..
                } => {
                    bail!(
                        "this face is already registered to {} (#{}), confidence {:.0}%",
                        existing.name,
                        existing.id,
                        confidence * 100.0
                    );
                }
                RegistrationOutcome::Rejected { message } => bail!("registration rejected: {message}"),
            }
        }
        FaceCommand::Images { person } => {
            let faces = app.api.person_face_images(person).await?;
            for image in faces.images {
                println!("#{:<5} {}", image.id, image.image_path);
            }
        }
        FaceCommand::Delete { image } => {
            let res = app.api.delete_face_image(image).await?;
            if !res.success {
                bail!(res.message.unwrap_or_else(|| "delete failed".into()));
            }
            println!("Deleted face image #{image}; {} remaining", res.remaining_images);
            if !res.user_recognizable {
                println!("This person can no longer be recognized until a new face is registered");
            }
            match res.model_status {
                Some(ModelStatus::Retrained) => println!("Model retrained"),
                Some(ModelStatus::InsufficientUsers) => {
                    println!("Model not retrained: at least two people with faces are required")
                }
                Some(ModelStatus::InsufficientImages) => {
                    println!("Model not retrained: not enough face images")
                }
                Some(ModelStatus::Unchanged) | None => {}
            }
        }
        FaceCommand::Train => {
            let summary = app.api.train_model().await?;
            if !summary.success {
                bail!(summary.message.unwrap_or_else(|| "training failed".into()));
            }
            match summary.details {
                Some(d) => println!(
                    "Trained on {} image(s) of {} people ({} used): accuracy {:.1}%, validation {:.1}%",
                    d.total_images,
                    d.total_users,
                    d.used_images,
                    d.accuracy * 100.0,
                    d.validation_accuracy * 100.0
                ),
                None => println!("{}", summary.message.unwrap_or_else(|| "Model trained".into())),
            }
        }
    }
    Ok(())
}

async fn recognize(
    app: &App,
    session_id: SessionId,
    esp32: Option<String>,
    once: bool,
    finish: bool,
) -> Result<()> {
    let attendance = Arc::new(app.attendance());
    let session = attendance.load_session(session_id).await.notified()?;
    if session.is_finished {
        bail!("session \"{}\" is finished; recognition cannot resume", session.name);
    }

    let esp32 = esp32.or_else(|| {
        (session.camera_mode == CameraMode::Esp32)
            .then(|| session.esp32_ip.clone())
            .flatten()
    });
    let camera = app.camera(esp32.as_deref()).await?;
    let recognition = RecognitionLoop::new(
        attendance.clone(),
        camera,
        app.backend(),
        app.notifier.clone(),
        app.config.loop_timing(),
    );

    if once {
        if let CycleOutcome::Recognized(added) = recognition.capture_once().await.notified()? {
            tracing::debug!(added = added.len(), "single capture recognized");
        }
    } else {
        run_loop(&recognition, &attendance, app.config.interval_secs).await?;
    }

    let already_finished = attendance.current_session().await.is_some_and(|s| s.is_finished);
    if finish && !already_finished {
        let session = attendance.finish_session().await.notified()?;
        println!("Finished \"{}\"", session.name);
    }
    if let Some(view) = attendance.view().await {
        print_view(&view);
    }
    Ok(())
}

/// Drive the auto loop until Ctrl-C or until it ends by itself.
async fn run_loop(recognition: &RecognitionLoop, attendance: &AttendanceState, interval_secs: u64) -> Result<()> {
    let mut phases = recognition.subscribe();
    let mut progress = tokio::time::interval(Duration::from_secs(1));
    let mut seen = attendance.recognized_users().await.len();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    recognition.start().await.notified()?;
    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                res?;
                break;
            }
            changed = phases.changed() => {
                if changed.is_err() {
                    break;
                }
                let phase = *phases.borrow_and_update();
                match phase {
                    LoopPhase::Countdown { remaining } => eprintln!("Starting in {remaining}..."),
                    LoopPhase::Running => {
                        eprintln!("Recognizing every {interval_secs}s; press Ctrl-C to stop")
                    }
                    LoopPhase::Idle => break,
                }
            }
            _ = progress.tick() => {
                let recognized = attendance.recognized_users().await;
                for user in recognized.iter().skip(seen) {
                    println!("{}  {}", user.timestamp.with_timezone(&Local).format("%H:%M:%S"), user.name);
                }
                seen = recognized.len();
            }
        }
    }
    recognition.stop();
    if attendance.current_session().await.is_some_and(|s| s.is_finished) {
        eprintln!("Session is finished; recognition stopped");
    }
    Ok(())
}

fn print_people(people: &[Person]) {
    for p in people {
        let tags: Vec<&str> = p.tags.iter().map(|t| t.name.as_str()).collect();
        println!("#{:<5} {:<24} {:<28} {}", p.id, p.name, p.email, tags.join(", "));
    }
}

fn print_view(view: &SessionView) {
    let session = &view.session;
    let stats = view.stats();
    let status = if session.is_finished { "finished" } else { "active" };
    println!("{} ({status})", session.name);
    println!(
        "{} present, {} absent of {} ({}%)",
        stats.present, stats.absent, stats.total, stats.percentage
    );

    if !view.recognized.is_empty() {
        println!("Recognized:");
        for user in &view.recognized {
            println!(
                "  {}  {}",
                user.timestamp.with_timezone(&Local).format("%H:%M:%S"),
                user.name
            );
        }
    }

    let breakdown = view.tag_breakdown();
    if breakdown.is_empty() {
        println!("Everyone has been recognized");
        return;
    }
    println!("Still missing:");
    for bucket in &breakdown.buckets {
        let names: Vec<&str> = bucket.people.iter().map(|p| p.name.as_str()).collect();
        println!("  {} ({}): {}", bucket.label(), names.len(), names.join(", "));
    }
}

fn parse_time(s: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|e| format!("expected HH:MM: {e}"))
}
