use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::task;
use topfive_core::auth::{FileCredentialStore, SessionManager, SignOutHook};
use topfive_core::config::ClientConfig;
use topfive_core::http::{ApiError, AuthClient, ReqwestTransport};
use topfive_core::models::{Match, Player, TeamStanding};
use topfive_core::services::{LeagueService, SquadService, TransferError, TransferService};
use tracing::debug;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "TopFive basketball manager CLI")]
struct Cli {
    /// Log request and refresh activity to stderr
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in and store credentials
    Login(LoginArgs),
    /// Forget stored credentials
    Logout,
    /// Show your squad or another team's
    Squad(SquadArgs),
    /// League table
    Standings(StandingsArgs),
    /// Fixtures and results
    Matches(MatchesArgs),
    /// Players available on the transfer market
    Market(OutputArgs),
    /// Sign a player from the transfer market
    Buy(BuyArgs),
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Output raw JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct LoginArgs {
    #[arg(long)]
    username: String,
    /// Prompted for when omitted
    #[arg(long)]
    password: Option<String>,
}

#[derive(Args, Debug)]
struct SquadArgs {
    /// Team id (defaults to your own team)
    #[arg(long)]
    team: Option<i64>,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct StandingsArgs {
    /// League id
    league: i64,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct MatchesArgs {
    /// League id (all leagues when omitted)
    league: Option<i64>,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct BuyArgs {
    /// Player id
    player: i64,
    /// Contract length in years (1-5)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=5))]
    years: u32,
    #[command(flatten)]
    output: OutputArgs,
}

/// Everything a command needs, wired so a failed refresh signs the user out.
struct App {
    session: SessionManager,
    client: AuthClient,
}

impl App {
    fn build() -> Result<Self> {
        let config = ClientConfig::from_env().context("invalid client configuration")?;
        let store = Arc::new(
            FileCredentialStore::with_default_locator()
                .context("unable to initialise credential store")?,
        );
        let transport =
            Arc::new(ReqwestTransport::new(&config).context("failed to build HTTP client")?);
        debug!(base_url = %config.base_url, "client configured");
        let session = SessionManager::new(store.clone(), transport.clone());
        let hook: Arc<dyn SignOutHook> = Arc::new(session.clone());
        let client = AuthClient::with_transport(config, store, transport).with_sign_out(hook);
        Ok(Self { session, client })
    }

    async fn require_session(&self) -> Result<()> {
        let state = self
            .session
            .restore()
            .await
            .context("failed to read stored session")?;
        if !state.authenticated {
            return Err(anyhow!("not logged in; run `topfive login`"));
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let app = App::build()?;
    match cli.command {
        Commands::Login(args) => login(&app, args).await?,
        Commands::Logout => logout(&app).await?,
        Commands::Squad(args) => squad(&app, args).await?,
        Commands::Standings(args) => standings(&app, args).await?,
        Commands::Matches(args) => matches(&app, args).await?,
        Commands::Market(args) => market(&app, args).await?,
        Commands::Buy(args) => buy(&app, args).await?,
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn login(app: &App, args: LoginArgs) -> Result<()> {
    let password = match args.password {
        Some(password) => password,
        None => prompt_for_password().await?,
    };
    let user = app
        .session
        .login(&args.username, &password)
        .await
        .context("login failed")?;

    println!("Logged in as {}.", user.username);
    if let Some(team) = &user.team_name {
        match &user.league_name {
            Some(league) => println!("Team: {team} ({league})"),
            None => println!("Team: {team}"),
        }
    }
    if let Some(budget) = user.budget {
        println!("Budget: {budget}");
    }
    Ok(())
}

async fn logout(app: &App) -> Result<()> {
    app.session
        .logout()
        .await
        .context("failed to remove stored credentials")?;
    println!("Logged out.");
    Ok(())
}

async fn prompt_for_password() -> Result<String> {
    task::spawn_blocking(|| -> Result<String> {
        use std::io::{self, Write};

        print!("Password: ");
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        Ok(input.trim_end_matches(['\r', '\n']).to_owned())
    })
    .await
    .context("password prompt was cancelled")?
}

async fn squad(app: &App, args: SquadArgs) -> Result<()> {
    app.require_session().await?;
    let service = SquadService::new(app.client.clone());
    let players = match args.team {
        Some(team_id) => service.team_squad(team_id).await,
        None => service.squad().await,
    }
    .map_err(explain)?;

    if args.output.json {
        return print_json(&players);
    }
    if let Some(team_id) = args.team {
        let standing = service.team_standing(team_id).await.map_err(explain)?;
        println!(
            "{}: {}-{} ({:.3}), point difference {:+}",
            standing.team_name,
            standing.wins,
            standing.losses,
            standing.win_percentage,
            standing.points_difference
        );
    }
    render_players(&players);
    Ok(())
}

async fn standings(app: &App, args: StandingsArgs) -> Result<()> {
    app.require_session().await?;
    let table = LeagueService::new(app.client.clone())
        .standings(args.league)
        .await
        .map_err(explain)?;

    if args.output.json {
        print_json(&table)
    } else {
        render_standings(&table);
        Ok(())
    }
}

async fn matches(app: &App, args: MatchesArgs) -> Result<()> {
    app.require_session().await?;
    let service = LeagueService::new(app.client.clone());
    let games = match args.league {
        Some(league_id) => service.matches(league_id).await,
        None => service.all_matches().await,
    }
    .map_err(explain)?;

    if args.output.json {
        print_json(&games)
    } else {
        render_matches(&games);
        Ok(())
    }
}

async fn market(app: &App, args: OutputArgs) -> Result<()> {
    app.require_session().await?;
    let players = TransferService::new(app.client.clone())
        .market()
        .await
        .map_err(explain)?;

    if args.json {
        print_json(&players)
    } else {
        render_players(&players);
        Ok(())
    }
}

async fn buy(app: &App, args: BuyArgs) -> Result<()> {
    app.require_session().await?;
    let receipt = TransferService::new(app.client.clone())
        .buy(args.player, args.years)
        .await
        .map_err(|err| match err {
            TransferError::Api(err) => explain(err),
            other => anyhow!(other),
        })?;

    if args.output.json {
        return print_json(&receipt);
    }
    match &receipt.detail {
        Some(detail) => println!("{detail}"),
        None => println!(
            "Signed player {} on a {}-year contract.",
            args.player, args.years
        ),
    }
    Ok(())
}

/// Turn a failed refresh into the message a user can act on.
fn explain(err: ApiError) -> anyhow::Error {
    if err.refresh_failure().is_some() {
        return anyhow::Error::new(err).context("session expired; run `topfive login` again");
    }
    anyhow::Error::new(err).context("request failed")
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_players(players: &[Player]) {
    if players.is_empty() {
        println!("No players.");
        return;
    }
    println!(
        "{:<6} {:<24} {:<4} {:>3} {:>6} {:>12}  {}",
        "ID", "NAME", "POS", "AGE", "RATING", "VALUE", "STATUS"
    );
    for player in players {
        let status = if player.is_injured {
            "injured".to_owned()
        } else {
            player
                .health_status
                .clone()
                .unwrap_or_else(|| "-".to_owned())
        };
        println!(
            "{:<6} {:<24} {:<4} {:>3} {:>6} {:>12}  {}",
            player.id,
            truncate(&player.full_name(), 24),
            player.position_primary,
            player.age,
            player.rating,
            player.market_value,
            status
        );
    }
}

fn render_standings(table: &[TeamStanding]) {
    if table.is_empty() {
        println!("No standings yet.");
        return;
    }
    println!(
        "{:>3} {:<24} {:>3} {:>3} {:>3} {:>6} {:>6}",
        "#", "TEAM", "GP", "W", "L", "DIFF", "PCT"
    );
    for (rank, row) in table.iter().enumerate() {
        println!(
            "{:>3} {:<24} {:>3} {:>3} {:>3} {:>+6} {:>6.3}",
            rank + 1,
            truncate(&row.team_name, 24),
            row.games_played,
            row.wins,
            row.losses,
            row.points_difference,
            row.win_percentage
        );
    }
}

fn render_matches(games: &[Match]) {
    if games.is_empty() {
        println!("No matches scheduled.");
        return;
    }
    for game in games {
        let score = match (game.home_team_score, game.away_team_score) {
            (Some(home), Some(away)) => format!("{home:>3} - {away:<3}"),
            _ => "  vs     ".to_owned(),
        };
        println!(
            "R{:<3} {}  {:>20} {} {:<20}",
            game.match_round,
            game.match_date.format("%Y-%m-%d %H:%M"),
            truncate(&game.home_team_name, 20),
            score,
            truncate(&game.away_team_name, 20)
        );
    }
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_owned();
    }
    let mut out: String = value.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}
