use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use coupon::api::*;
use coupon::client::Client;
use coupon::controller::{Session, SlipController, SlipEvents, SubmitOutcome};
use coupon::drawer::{DragFeedback, Drawer, DrawerState};
use coupon::settings::Settings;
use coupon::slip::{parse_stake, Slip};
use env_logger::{Builder, WriteStyle};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

#[derive(Parser)]
struct Args {
    #[command(subcommand)]
    command: Commands,
    /// Overrides `server_url` from the settings
    #[arg(short, long)]
    url: Option<String>,
    #[arg(short, long)]
    config: Option<String>,
}
#[derive(Subcommand)]
enum Commands {
    /// Creates the user and stores the credentials in the working directory
    Register {
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        token: String,
    },
    Balance,
    Questions,
    Coupons,
    NewQuestion {
        #[arg(short, long)]
        question: String,
        #[arg(short, long)]
        yes_odds: Odds,
        #[arg(short, long)]
        no_odds: Odds,
    },
    CloseQuestion {
        #[arg(short, long)]
        question: QuestionId,
    },
    AdjustBalance {
        #[arg(short, long)]
        user: UserId,
        #[arg(short, long)]
        amount: Credits,
    },
    /// Builds a coupon from `question:side:odds[:boost]` picks and submits it
    Submit {
        #[arg(short, long, required = true)]
        pick: Vec<Pick>,
        #[arg(short, long)]
        stake: Option<String>,
    },
    /// Interactive slip with a drawer, type `help` for commands
    Play,
}

#[derive(Debug, Clone, PartialEq)]
struct Pick {
    question: QuestionId,
    side: Side,
    odds: Odds,
    boosted: bool,
}
impl FromStr for Pick {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        let (question, side, odds, boosted) = match parts.as_slice() {
            [question, side, odds] => (question, side, odds, false),
            [question, side, odds, "boost"] => (question, side, odds, true),
            _ => bail!("expected question:side:odds[:boost], got \"{}\"", s),
        };
        let odds = Odds::from_str(odds).context("invalid odds")?;
        if odds <= Odds::ZERO {
            bail!("odds have to be positive, got {}", odds);
        }
        Ok(Pick {
            question: question.parse().context("invalid question id")?,
            side: side.parse()?,
            odds,
            boosted,
        })
    }
}

/// Remembers which views went stale so they can be refetched after a submit.
#[derive(Default, Clone)]
struct ConsoleEvents {
    balance_stale: Arc<AtomicBool>,
    coupons_stale: Arc<AtomicBool>,
}
impl SlipEvents for ConsoleEvents {
    fn refresh_balance(&self) {
        self.balance_stale.store(true, Ordering::SeqCst);
    }
    fn invalidate_coupons(&self) {
        self.coupons_stale.store(true, Ordering::SeqCst);
    }
    fn submission_failed(&self, message: &str) {
        eprintln!("{}", message);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Args::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    Builder::default()
        .filter_level(settings.log_level())
        .write_style(WriteStyle::Always)
        .init();
    let url = cli.url.unwrap_or(settings.server_url.clone());
    let client = Client::with_timeout(url, settings.request_timeout())?;

    match cli.command {
        Commands::Register { user, token } => {
            let access = AccessRequest { user, token };
            let balance = client.register(access.clone()).await?;
            File::create("user")
                .await?
                .write_all(access.user.as_bytes())
                .await?;
            File::create("access_token")
                .await?
                .write_all(access.token.as_bytes())
                .await?;
            println!("Registered {} with {} credits", access.user, balance);
        }
        Commands::Balance => {
            let balance = client.get_balance(get_access().await?).await?;
            println!("{} credits", balance);
        }
        Commands::Questions => {
            for question in client.get_questions().await? {
                println!(
                    "#{} [{}] {} yes {} / no {}",
                    question.id,
                    question.state,
                    question.question,
                    question.yes_odds,
                    question.no_odds
                );
            }
        }
        Commands::Coupons => {
            let coupons = client.get_coupons(get_access().await?).await?;
            println!("{:#?}", coupons);
        }
        Commands::NewQuestion {
            question,
            yes_odds,
            no_odds,
        } => {
            let request = NewQuestionRequest {
                question,
                yes_odds,
                no_odds,
            };
            let id = client.new_question(request, get_access().await?).await?;
            println!("Created question: {}", id);
        }
        Commands::CloseQuestion { question } => {
            client.close_question(question, get_access().await?).await?;
        }
        Commands::AdjustBalance { user, amount } => {
            let data = AdjustBalanceRequest { user, amount };
            let balance = client.adjust_balance(data, get_access().await?).await?;
            println!("New balance: {}", balance);
        }
        Commands::Submit { pick, stake } => {
            let mut slip = Slip::new(settings.slip.default_stake);
            for pick in pick {
                slip.upsert_selection(pick.question, pick.side, pick.odds, pick.boosted);
            }
            if let Some(stake) = stake {
                slip.set_stake(parse_stake(&stake)?)?;
            }
            let events = ConsoleEvents::default();
            let controller = start_session(&client, &settings, slip, &events).await?;
            if controller.stake_exceeds_balance() {
                eprintln!("Warning: stake is higher than the current balance");
            }
            submit(&client, &controller, &events).await?;
        }
        Commands::Play => play(&client, &settings).await?,
    }
    Ok(())
}

async fn start_session(
    client: &Client,
    settings: &Settings,
    slip: Slip,
    events: &ConsoleEvents,
) -> Result<SlipController> {
    let access = get_access().await?;
    let balance = client
        .get_balance_with_retry(access.clone(), settings.profile_retry)
        .await?;
    Ok(SlipController::new(
        slip,
        Session {
            access,
            balance: Some(balance),
        },
        Box::new(client.clone()),
        Box::new(events.clone()),
    ))
}

async fn submit(client: &Client, controller: &SlipController, events: &ConsoleEvents) -> Result<()> {
    match controller.submit().await {
        SubmitOutcome::Settled(receipt) => println!(
            "Coupon {} placed: {} credits at {} pays {}",
            receipt.coupon_id, receipt.stake_amount, receipt.total_odds, receipt.potential_payout
        ),
        SubmitOutcome::Skipped(reason) => println!("Nothing submitted: {:?}", reason),
        SubmitOutcome::Failed(_) => {}
    }
    let access = &controller.session().access;
    if events.balance_stale.swap(false, Ordering::SeqCst) {
        println!("Balance: {}", client.get_balance(access.clone()).await?);
    }
    if events.coupons_stale.swap(false, Ordering::SeqCst) {
        let coupons = client.get_coupons(access.clone()).await?;
        println!("You have {} coupons", coupons.len());
    }
    Ok(())
}

const HELP: &str = "\
questions                  list questions
vote <id> <yes|no> [boost] put a question on the slip
remove <id>                take a question off the slip
stake <amount>             set the stake
show                       print the slip
submit                     place the coupon
clear                      empty the slip
open | close | done        drawer requests, `done` finishes the animation
drag <dy> | release <v>    drag the open drawer and let go
quit";

async fn play(client: &Client, settings: &Settings) -> Result<()> {
    let events = ConsoleEvents::default();
    let controller = start_session(
        client,
        settings,
        Slip::new(settings.slip.default_stake),
        &events,
    )
    .await?;
    let mut drawer = Drawer::new(settings.drawer);
    let mut questions = client.get_questions().await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{}", HELP);

    while let Some(line) = lines.next_line().await? {
        let words: Vec<&str> = line.split_whitespace().collect();
        let result = match words.as_slice() {
            [] => Ok(()),
            ["quit"] => break,
            ["help"] => {
                println!("{}", HELP);
                Ok(())
            }
            ["questions"] => match client.get_questions().await {
                Ok(fetched) => {
                    questions = fetched;
                    for question in questions.iter() {
                        println!("#{} [{}] {}", question.id, question.state, question.question);
                    }
                    Ok(())
                }
                Err(e) => Err(e),
            },
            ["vote", id, side, rest @ ..] => vote(&controller, &questions, id, side, rest),
            ["remove", id] => id
                .parse::<QuestionId>()
                .context("invalid question id")
                .map(|id| {
                    if !controller.remove_question(id) {
                        println!("Question {} isn't on the slip", id);
                    }
                }),
            ["stake", amount] => parse_stake(amount)
                .and_then(|stake| controller.set_stake(stake))
                .map_err(anyhow::Error::from),
            ["show"] => {
                show(&controller, &drawer);
                Ok(())
            }
            ["submit"] => submit(client, &controller, &events).await,
            ["clear"] => {
                controller.clear();
                Ok(())
            }
            ["open"] => {
                println!("{:?}", drawer.open());
                Ok(())
            }
            ["close"] => {
                println!("{:?}", drawer.close());
                Ok(())
            }
            ["done"] => {
                println!("{:?}", drawer.transition_finished());
                Ok(())
            }
            ["drag", dy] => dy.parse::<f64>().context("invalid distance").map(|dy| {
                if drawer.state() == DrawerState::Open {
                    drawer.drag_begin();
                }
                match drawer.drag_move(dy) {
                    DragFeedback::Tracking(at) => println!("Dragged to {}", at),
                    DragFeedback::Resisted => println!("Can't drag above the top"),
                    DragFeedback::Ignored => println!("Drawer isn't open"),
                }
            }),
            ["release", velocity] => velocity
                .parse::<f64>()
                .context("invalid velocity")
                .map(|velocity| println!("{:?}", drawer.drag_end(velocity))),
            _ => Err(anyhow::anyhow!("unknown command, try `help`")),
        };
        if let Err(e) = result {
            eprintln!("{}", map_any_err(e));
        }
    }
    Ok(())
}

fn vote(
    controller: &SlipController,
    questions: &[QuestionResponse],
    id: &str,
    side: &str,
    rest: &[&str],
) -> Result<()> {
    let id: QuestionId = id.parse().context("invalid question id")?;
    let side: Side = side.parse()?;
    let boosted = match rest {
        [] => false,
        ["boost"] => true,
        _ => bail!("usage: vote <id> <yes|no> [boost]"),
    };
    let question = questions
        .iter()
        .find(|q| q.id == id)
        .with_context(|| format!("unknown question {}, try `questions`", id))?;
    if question.state != QuestionState::Open {
        bail!("question {} is closed", id);
    }
    controller.upsert_selection(id, side, question.odds_for(side), boosted);
    Ok(())
}

fn show(controller: &SlipController, drawer: &Drawer) {
    let slip = controller.slip();
    println!("Drawer: {:?}", drawer.state());
    if !drawer.is_visible() {
        println!("{} selections on the slip", slip.len());
        return;
    }
    for selection in slip.selections() {
        println!(
            "#{} {} @ {}{}",
            selection.question_id,
            selection.side,
            selection.odds,
            if selection.boosted { " (boost)" } else { "" }
        );
    }
    println!(
        "Stake {} | odds {} | payout {}",
        slip.stake(),
        slip.aggregate_odds(),
        slip.display_payout()
    );
}

async fn get_access() -> Result<AccessRequest> {
    let user = read_file("user").await?;
    let token = read_file("access_token").await?;
    Ok(AccessRequest { user, token })
}
async fn read_file(path: &str) -> Result<String> {
    let mut file = File::open(path)
        .await
        .with_context(|| format!("couldn't open {}, register first", path))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).await?;
    Ok(contents.trim().to_string())
}
