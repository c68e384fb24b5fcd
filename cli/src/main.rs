//! `tripflow` binary
//!
//! Runs the booking flow of an itinerary against the configured backend.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tripflow_api::{HttpTravelApi, Itinerary, ItineraryToken, Room, TravelApi};
use tripflow_booking::{
    AllocationAction, BookingEnvironment, BookingFlowReducer, BookingFlowState, CommitStatus,
    ConfirmationAction, ConfirmationStatus, FlowAction, InitiatorStatus, PriceCheckAction,
    PriceSummary, Stage, Tokens, config,
};
use tripflow_runtime::Store;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type FlowStore = Store<BookingFlowState, FlowAction, BookingEnvironment, BookingFlowReducer>;

/// Upper bound on one stage of the flow; every request is also bounded by the HTTP timeout
const STAGE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Parser)]
#[command(name = "tripflow")]
#[command(about = "Book a multi-city itinerary")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate travelers, allocate, recheck prices and commit the booking
    Book {
        /// Itinerary token
        #[arg(long)]
        itinerary: String,
        /// JSON file with the rooms and their travelers
        #[arg(long)]
        rooms: PathBuf,
        /// Free-text requests passed to the booking
        #[arg(long)]
        special_requirements: Option<String>,
        /// Accept the rechecked prices without asking
        #[arg(long)]
        yes: bool,
    },
    /// Print the resources of an itinerary
    Itinerary {
        /// Itinerary token
        #[arg(long)]
        itinerary: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load().context("failed to load configuration")?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_filter))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let api: Arc<dyn TravelApi> = Arc::new(HttpTravelApi::new(config.client_settings())?);

    match cli.command {
        Commands::Itinerary { itinerary } => {
            let itinerary = api.get_itinerary(ItineraryToken::new(itinerary)).await?;
            print_itinerary(&itinerary);
            Ok(())
        },
        Commands::Book {
            itinerary,
            rooms,
            special_requirements,
            yes,
        } => {
            let rooms = read_rooms(&rooms)?;
            let itinerary = api.get_itinerary(ItineraryToken::new(itinerary)).await?;
            let inquiry = config
                .inquiry_token
                .clone()
                .unwrap_or_else(|| itinerary.inquiry_token.clone());
            let tokens = Tokens::new(itinerary.itinerary_token.clone(), inquiry);

            let env = BookingEnvironment::new(api).with_retry_policy(config.retry_policy());
            let store = Store::new(BookingFlowState::default(), BookingFlowReducer, env);
            let result = book(&store, tokens, itinerary, rooms, special_requirements, yes).await;
            if let Err(error) = store.shutdown(Duration::from_secs(5)).await {
                tracing::warn!(%error, "Store did not shut down cleanly");
            }
            result
        },
    }
}

fn read_rooms(path: &Path) -> anyhow::Result<Vec<Room>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse rooms from {}", path.display()))
}

async fn book(
    store: &FlowStore,
    tokens: Tokens,
    itinerary: Itinerary,
    rooms: Vec<Room>,
    special_requirements: Option<String>,
    yes: bool,
) -> anyhow::Result<()> {
    let mut actions = Box::pin(store.actions());
    let reporter = tokio::spawn(async move {
        while let Some(action) = actions.next().await {
            report(&action);
        }
    });

    let outcome = run(store, tokens, itinerary, rooms, special_requirements, yes).await;

    reporter.abort();
    outcome
}

async fn run(
    store: &FlowStore,
    tokens: Tokens,
    itinerary: Itinerary,
    rooms: Vec<Room>,
    special_requirements: Option<String>,
    yes: bool,
) -> anyhow::Result<()> {
    let state = step(
        store,
        FlowAction::Start {
            tokens,
            itinerary,
            rooms,
            special_requirements,
        },
    )
    .await?;

    match (&state.stage, &state.initiator.status) {
        (Stage::Allocated, _) => {},
        (_, InitiatorStatus::Invalid(error)) => bail!("{error}"),
        (_, InitiatorStatus::Rejected(error)) => bail!("booking was rejected: {error}"),
        (Stage::Remediation, _) => {
            for failure in &state.allocation.failed {
                println!("  {}: {}", failure.target, failure.user_message());
            }
            bail!(
                "{} allocation(s) failed; replace or retry them before booking",
                state.allocation.failed.len()
            );
        },
        (stage, _) => bail!("booking stopped at {stage:?}"),
    }

    let state = step(store, FlowAction::ProceedToPriceCheck).await?;
    let Some(summary) = state.prices.summary else {
        bail!("price check did not complete");
    };
    print_summary(&summary);

    if !yes && !confirm("Confirm these prices and book?").await? {
        println!("Booking not confirmed.");
        return Ok(());
    }

    step(store, FlowAction::Prices(PriceCheckAction::Confirm)).await?;
    let state = step(store, FlowAction::ProceedToCommit).await?;

    if let Some(error) = &state.error {
        bail!("{error}");
    }
    if let CommitStatus::Failed(error) = &state.commit.status {
        bail!("final booking failed: {error}");
    }
    if let ConfirmationStatus::Failed(error) = &state.confirmation.status {
        bail!("resource confirmation failed: {error}");
    }

    println!();
    for item in &state.confirmation.items {
        match &item.error {
            Some(error) => println!("  {} {}: failed ({error})", item.booking.kind(), item.booking.reference()),
            None => println!("  {} {}: {:?}", item.booking.kind(), item.booking.reference(), item.status),
        }
    }
    if let Some(booking_id) = state.commit.committed_booking_id() {
        println!("\nBooking {booking_id} complete.");
    }
    Ok(())
}

async fn step(store: &FlowStore, action: FlowAction) -> anyhow::Result<BookingFlowState> {
    store.send(action).await?;
    store.settled(STAGE_TIMEOUT).await?;
    Ok(store.state(Clone::clone).await)
}

fn report(action: &FlowAction) {
    match action {
        FlowAction::Allocation(AllocationAction::ItemStarted(progress)) => {
            println!("Allocating {} of {}: {}", progress.current, progress.total, progress.item);
        },
        FlowAction::Prices(PriceCheckAction::ItemStarted(progress)) => {
            println!("Checking price {} of {}: {}", progress.current, progress.total, progress.item.label);
        },
        FlowAction::Confirmation(ConfirmationAction::ItemStarted(progress)) => {
            println!(
                "Booking {} of {}: {} {}",
                progress.current,
                progress.total,
                progress.item.kind(),
                progress.item.reference()
            );
        },
        _ => {},
    }
}

fn print_summary(summary: &PriceSummary) {
    println!();
    println!("{:<12}{:>14}{:>14}", "", "Original", "New");
    for (label, original, new) in [
        ("Flights", summary.original_totals.flights, summary.new_totals.flights),
        ("Hotels", summary.original_totals.hotels, summary.new_totals.hotels),
        ("Activities", summary.original_totals.activities, summary.new_totals.activities),
        ("Transfers", summary.original_totals.transfers, summary.new_totals.transfers),
        ("Total", summary.original_totals.total, summary.new_totals.total),
    ] {
        println!("{label:<12}{original:>14.2}{new:>14.2}");
    }
    if summary.has_price_changed {
        println!(
            "\nPrices changed by {:+.2} ({:+.2}%).",
            summary.difference, summary.percentage_change
        );
    } else {
        println!("\nPrices are unchanged.");
    }
}

async fn confirm(question: &str) -> anyhow::Result<bool> {
    println!("{question} [y/N]");
    let answer = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| line)
    })
    .await??;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn print_itinerary(itinerary: &Itinerary) {
    println!("Itinerary {}", itinerary.itinerary_token);
    for city in &itinerary.cities {
        println!("\n{}, {}", city.city, city.country);
        for day in &city.days {
            println!("  {}", day.date);
            for flight in &day.flights {
                println!(
                    "    flight   {} {} -> {} {:.2}",
                    flight.flight_code, flight.origin, flight.destination, flight.price
                );
            }
            for hotel in &day.hotels {
                println!("    hotel    {} {} {:.2}", hotel.hotel_id, hotel.name, hotel.price);
            }
            for activity in &day.activities {
                println!("    activity {} {} {:.2}", activity.activity_code, activity.name, activity.price);
            }
            for transfer in &day.transfers {
                println!(
                    "    transfer {} {} {:.2}",
                    transfer.quotation_id, transfer.description, transfer.price
                );
            }
        }
    }
}
