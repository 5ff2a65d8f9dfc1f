//! Command parsing and execution.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use tracing::info;

use moodwalk_client::community::Community;
use moodwalk_client::coupons::{offer_for, CouponBook};
use moodwalk_client::history::HistoryBook;
use moodwalk_client::map::GeoJsonSurface;
use moodwalk_client::nav::{ChannelNavigator, Route};
use moodwalk_client::orchestrator::AnalyzeOrchestrator;
use moodwalk_client::profile::{ProfileDraft, ProfileEditor, SignupForm, SignupOutcome};
use moodwalk_client::results::{Body, MapPanel, ResultsView};
use moodwalk_common::timefmt::today_kst;

use crate::App;

/// Output file of `analyze`.
const MAP_FILE: &str = "trail-map.geojson";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Analyze(String),
    History,
    DeleteHistory(String),
    Me,
    UpdateMe(ProfileDraft),
    Register(ProfileDraft),
    Coupons,
    Community(Option<String>),
}

impl Command {
    pub const NAMES: [&'static str; 8] = [
        "analyze",
        "history",
        "delete-history",
        "me",
        "update-me",
        "register",
        "coupons",
        "community",
    ];

    pub fn parse(args: &[String]) -> Result<Command> {
        let (name, rest) = args.split_first().context("missing command")?;
        let profile = || -> Result<ProfileDraft> {
            match rest {
                [username, music_taste, residence] => Ok(ProfileDraft {
                    username: username.clone(),
                    music_taste: music_taste.clone(),
                    residence: residence.clone(),
                }),
                _ => bail!("{name} takes <username> <music> <residence>"),
            }
        };

        Ok(match name.as_str() {
            "analyze" if !rest.is_empty() => Command::Analyze(rest.join(" ")),
            "analyze" => bail!("analyze takes the text to analyse"),
            "history" => Command::History,
            "delete-history" => match rest {
                [id] => Command::DeleteHistory(id.clone()),
                _ => bail!("delete-history takes one id"),
            },
            "me" => Command::Me,
            "update-me" => Command::UpdateMe(profile()?),
            "register" => Command::Register(profile()?),
            "coupons" => Command::Coupons,
            "community" => Command::Community((!rest.is_empty()).then(|| rest.join(" "))),
            other => bail!("unknown command: {other}"),
        })
    }
}

pub async fn run(app: &App, command: Command) -> Result<()> {
    // register creates the account itself; everything else needs one.
    if !matches!(command, Command::Register(_)) {
        sign_in(app).await?;
    }
    match command {
        Command::Analyze(text) => analyze(app, &text).await,
        Command::History => history(app).await,
        Command::DeleteHistory(id) => delete_history(app, &id).await,
        Command::Me => me(app).await,
        Command::UpdateMe(draft) => update_me(app, draft).await,
        Command::Register(draft) => register(app, draft).await,
        Command::Coupons => coupons(app),
        Command::Community(message) => community(app, message.as_deref()).await,
    }
}

fn credentials() -> Result<(String, String)> {
    let email = std::env::var("MOODWALK_EMAIL").context("MOODWALK_EMAIL is not set")?;
    let password = std::env::var("MOODWALK_PASSWORD").context("MOODWALK_PASSWORD is not set")?;
    Ok((email, password))
}

async fn sign_in(app: &App) -> Result<()> {
    let (email, password) = credentials()?;
    app.auth
        .login(&email, &password)
        .await
        .map_err(|e| anyhow!(e.user_message()))
        .context("Sign-in failed")?;
    Ok(())
}

// ── analyze ─────────────────────────────────────────────────────────────────

async fn analyze(app: &App, text: &str) -> Result<()> {
    let orchestrator = AnalyzeOrchestrator::new(app.api.clone(), app.auth.clone(), app.location.clone());
    orchestrator.submit(text).await;
    if let Some(error) = orchestrator.snapshot().error {
        bail!(error);
    }

    let (nav, mut routes) = ChannelNavigator::new();
    orchestrator.go_to_results(&nav);
    let Ok(Route::Results(result)) = routes.try_recv() else {
        bail!("No analysis result");
    };
    let Some(view) = ResultsView::project(Some(&result)) else {
        bail!("No analysis result");
    };

    println!("{}  📍 {}", today_kst(Utc::now()), app.location.current_address());
    println!();
    println!("감정 분석: {}", view.emotion);
    if !view.keywords.is_empty() {
        println!("  {}", view.keywords.join(" "));
    }
    match &view.body {
        Body::Error(message) => println!("\n{message}"),
        Body::Recommendations { comfort, music, music_placeholder } => {
            println!("\n공감의 한마디\n  {comfort}");
            println!("\n추천 음악");
            for card in music {
                println!("  {}\n    {}", card.heading, card.reason);
            }
            if let Some(placeholder) = music_placeholder {
                println!("  {placeholder}");
            }
        }
    }
    if let Some(guidance) = &view.guidance {
        println!("\n{guidance}");
    }
    println!("\n추천 산책로");
    for card in &view.trails {
        println!("  {} ({})", card.trail.name, card.trail.address);
        if let Some(score) = &card.score_label {
            println!("    {score}");
        }
    }
    if let Some(placeholder) = view.trails_placeholder {
        println!("  {placeholder}");
    }

    if let Some(first) = view.trails.first() {
        // Picking the top trail is what a click on its card would do.
        app.selected.save(&first.trail, Utc::now()).map_err(|e| anyhow!(e.user_message()))?;
        let offer = offer_for(&first.trail.name);
        println!("\n{} {}\n  {} ({})", offer.title, offer.subtitle, offer.coupon_name, offer.trail_label);

        let mut panel = MapPanel::new(GeoJsonSurface::new());
        panel.open(&first.trail, app.location.current_location());
        panel.renderer().surface().write(Path::new(MAP_FILE))?;
        info!("Map of {} written to {MAP_FILE}", first.trail.name);
    }
    Ok(())
}

// ── history ─────────────────────────────────────────────────────────────────

async fn history(app: &App) -> Result<()> {
    let book = HistoryBook::new(app.api.clone(), app.auth.clone());
    book.load().await;
    let state = book.state();
    if let Some(error) = state.error {
        bail!(error);
    }
    println!("{}", state.count_label());
    for row in book.rows() {
        println!("{}  {}", row.id, row.date);
        println!("  감정 분석: {}", row.emotion);
        println!("  추천 산책로: {}", row.trails);
    }
    Ok(())
}

async fn delete_history(app: &App, id: &str) -> Result<()> {
    let book = HistoryBook::new(app.api.clone(), app.auth.clone());
    // Naming the id on the command line is the confirmation.
    if !book.delete(id, |_| true).await {
        bail!(book.state().error.unwrap_or_default());
    }
    println!("{id} 삭제됨");
    Ok(())
}

// ── profile ─────────────────────────────────────────────────────────────────

async fn me(app: &App) -> Result<()> {
    let editor = ProfileEditor::new(app.api.clone(), app.auth.clone());
    if !editor.load().await {
        bail!(editor.state().error.unwrap_or_default());
    }
    let profile = editor.state().profile.unwrap_or_default();
    println!("이름: {}", profile.username);
    println!("이메일: {}", profile.email);
    println!("음악 취향: {}", profile.music_taste);
    println!("거주지: {}", profile.residence);
    Ok(())
}

async fn update_me(app: &App, draft: ProfileDraft) -> Result<()> {
    let editor = ProfileEditor::new(app.api.clone(), app.auth.clone());
    if !editor.load().await {
        bail!(editor.state().error.unwrap_or_default());
    }
    editor.begin_edit();
    editor.edit(|d| *d = draft);
    if !editor.save().await {
        bail!(editor.state().error.unwrap_or_default());
    }
    println!("{}", editor.state().success.unwrap_or_default());
    Ok(())
}

async fn register(app: &App, draft: ProfileDraft) -> Result<()> {
    let (email, password) = credentials()?;
    let form = SignupForm {
        email,
        confirm_password: password.clone(),
        password,
        username: draft.username,
        music_taste: draft.music_taste,
        residence: draft.residence,
    };
    let outcome = form
        .signup(&app.auth, &app.api)
        .await
        .map_err(|e| anyhow!(e.user_message()))?;
    match outcome {
        SignupOutcome::Complete => println!("회원가입이 완료되었습니다."),
        SignupOutcome::AccountOnly { message } => println!("{message}"),
    }
    Ok(())
}

// ── coupons ─────────────────────────────────────────────────────────────────

fn coupons(app: &App) -> Result<()> {
    let coupons = CouponBook::new(app.auth.clone())
        .load()
        .map_err(|e| anyhow!(e.user_message()))?;
    for c in coupons {
        println!("{} {} [{}]", c.icon(), c.name, c.status_label());
        println!("  {} · {} · {}까지", c.description, c.trail_name, c.valid_until_label());
    }
    Ok(())
}

// ── community ───────────────────────────────────────────────────────────────

async fn community(app: &App, message: Option<&str>) -> Result<()> {
    let (nav, _routes) = ChannelNavigator::new();
    let community = Community {
        auth: app.auth.clone(),
        api: app.api.clone(),
        selected: app.selected.clone(),
        chat: app.chat.clone(),
        nav: Arc::new(nav),
        history_limit: app.chat_history_limit,
    };
    let room = community
        .enter(None)
        .await
        .map_err(|e| anyhow!(e.user_message()))?;
    println!("{} ({})", room.title(), room.display_name());

    if let Some(text) = message {
        let mut state = room.subscribe();
        if room.send(text).await {
            state.wait_for(|s| !s.messages.is_empty()).await?;
        } else if let Some(error) = room.state().error {
            bail!(error);
        }
    }
    for line in room.lines(Utc::now()) {
        let who = line.user_name.as_deref().unwrap_or(if line.is_mine { "나" } else { "" });
        println!("  [{}] {who} {}", line.time, line.text);
    }
    room.leave();
    Ok(())
}
