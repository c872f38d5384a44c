use crate::infra::{bootstrap, parse_date, Bootstrap};
use chrono::{Local, NaiveDate, TimeZone, Utc};
use clap::Args;
use collab_exchange::config::EngineConfig;
use collab_exchange::error::AppError;
use collab_exchange::marketplace::{
    Actor, DemandDraft, DemandImporter, ErrorKind, EscrowPolicy, HistoryScope, ManualClock,
    Marketplace, RewardType, Role, SystemClock, Urgency, UserId,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Calendar date the demo runs on (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Refuse escrow that exceeds the creator's balance instead of flooring at zero.
    #[arg(long)]
    pub(crate) strict: bool,
}

#[derive(Args, Debug)]
pub(crate) struct ImportArgs {
    /// CSV export with title, description, reward_type, reward_value, urgency, tags and
    /// customer_info columns.
    #[arg(long)]
    pub(crate) csv: PathBuf,
    /// Seeded member publishing every imported demand.
    #[arg(long, default_value = "employee1")]
    pub(crate) creator: String,
    /// Refuse escrow that exceeds the creator's balance instead of flooring at zero.
    #[arg(long)]
    pub(crate) strict: bool,
}

fn engine_config(strict: bool) -> EngineConfig {
    let escrow_policy = if strict {
        EscrowPolicy::StrictRefusal
    } else {
        EscrowPolicy::ClampAtZero
    };
    EngineConfig {
        escrow_policy,
        ..EngineConfig::default()
    }
}

fn seeded_actor(engine: &Marketplace, id: &str) -> Result<Actor, AppError> {
    engine
        .members
        .fetch(&UserId::new(id))
        .map_err(|err| AppError::Marketplace {
            kind: ErrorKind::from(&err),
            message: err.to_string(),
        })?
        .map(|member| member.actor())
        .ok_or_else(|| AppError::Marketplace {
            kind: ErrorKind::NotFound,
            message: format!("no seeded member named '{id}'"),
        })
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { today, strict } = args;

    let today = today.unwrap_or_else(|| Local::now().date_naive());
    let start = Utc.from_utc_datetime(&today.and_hms_opt(9, 0, 0).unwrap_or_default());
    let clock = Arc::new(ManualClock::new(start));
    let Bootstrap { engine, feed } = bootstrap(engine_config(strict), clock.clone())?;

    let creator = seeded_actor(&engine, "employee1")?;
    let helper = seeded_actor(&engine, "employee2")?;

    println!("Collaboration exchange demo ({today})");
    print_balances(&engine)?;

    println!("\nPublishing a points demand");
    let demand = engine.lifecycle.publish(
        &creator,
        DemandDraft {
            title: "Translate the onboarding handbook".to_string(),
            description: "Spanish edition for the new regional office".to_string(),
            customer_info: "People Operations".to_string(),
            tags: vec!["translation".to_string()],
            urgency: Urgency::Urgent,
            reward_type: RewardType::Points,
            reward_value: 800,
        },
    )?;
    println!(
        "- {} '{}' -> {} | {} points escrowed from {}",
        demand.id,
        demand.title,
        demand.status.label(),
        demand.escrowed,
        creator.display_name
    );
    engine.activity.record_now(&creator.user_id)?;

    println!("\nAccepting and completing");
    let accepted = engine.lifecycle.accept(&demand.id, &helper)?;
    println!("- {} accepted by {}", accepted.id, helper.display_name);
    engine.activity.record_now(&helper.user_id)?;
    clock.advance(chrono::Duration::hours(3));
    let completed = engine.lifecycle.complete(&demand.id, &creator)?;
    println!(
        "- {} {} | {} points paid to {}",
        completed.id,
        completed.status.label(),
        completed.reward_value,
        helper.display_name
    );
    print_balances(&engine)?;

    let admin = seeded_actor(&engine, "admin")?;
    println!("\nLedger");
    for entry in engine.ledger.history(&HistoryScope::All, &admin)? {
        println!(
            "  #{} {:<10} {:>+6} -> {:>6} ({}{})",
            entry.sequence,
            entry.user_id.as_str(),
            entry.change_amount,
            entry.balance_after,
            entry.reason.label(),
            if entry.shortfall > 0 {
                format!(", {} short", entry.shortfall)
            } else {
                String::new()
            }
        );
    }

    println!("\nDaily activity cap");
    let mut count = 0;
    for _ in 0..4 {
        count = engine.activity.record_now(&helper.user_id)?;
    }
    println!(
        "- {} pinged four times today, counted {count}",
        helper.display_name
    );

    let week = engine.activity.current_week();
    let board =
        engine
            .activity
            .leaderboard(week, Role::Employee, engine.config.leaderboard_limit)?;
    println!("\nLeaderboard {} .. {}", week.start, week.end);
    for (rank, entry) in board.top.iter().enumerate() {
        println!(
            "  {}. {} - {} points of activity over {} day(s)",
            rank + 1,
            entry.display_name,
            entry.score,
            entry.active_days
        );
    }

    println!("\nNotifications delivered: {}", feed.len());
    for notification in feed.visible_to(&creator.user_id, creator.role).iter().take(3) {
        println!("  - [{}] {}", notification.title, notification.content);
    }

    Ok(())
}

/// Publish every CSV row into a throwaway engine and report what would have happened.
pub(crate) fn run_import(args: ImportArgs) -> Result<(), AppError> {
    let ImportArgs {
        csv,
        creator,
        strict,
    } = args;

    let Bootstrap { engine, .. } = bootstrap(engine_config(strict), Arc::new(SystemClock))?;
    let creator = seeded_actor(&engine, &creator)?;
    let opening = engine.ledger.balance_of(&creator.user_id)?;

    let summary = DemandImporter::from_path(&csv, &engine.lifecycle, &creator)?;

    println!("Dry-run import of {}", csv.display());
    println!(
        "- {} row(s) read | {} published | {} rejected",
        summary.total(),
        summary.published.len(),
        summary.rejected.len()
    );
    println!(
        "- {} balance {} -> {}",
        creator.display_name,
        opening,
        engine.ledger.balance_of(&creator.user_id)?
    );
    for rejected in &summary.rejected {
        println!(
            "  row {}: '{}' rejected ({}): {}",
            rejected.row,
            rejected.title,
            rejected.kind.label(),
            rejected.reason
        );
    }

    Ok(())
}

fn print_balances(engine: &Marketplace) -> Result<(), AppError> {
    println!("Balances");
    for member in engine.members.list().map_err(|err| AppError::Marketplace {
        kind: ErrorKind::from(&err),
        message: err.to_string(),
    })? {
        println!(
            "  {:<10} {:<10} {:>6}",
            member.id.as_str(),
            member.role.label(),
            engine.ledger.balance_of(&member.id)?
        );
    }
    Ok(())
}
