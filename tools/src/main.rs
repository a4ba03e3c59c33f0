//! ledger-runner: headless runner for the ledger core.
//!
//! Opens a handful of accounts (one of them a loan) and a group, pushes
//! ad-hoc transactions through the approval chain, runs one recurring payment on a real thread for a number
//! of periods, then prints a summary and the most recent audit entries.
//!
//! Usage:
//!   ledger-runner --ticks 5 --period-ms 200
//!   ledger-runner --config ledger.json --recent 20

use anyhow::Result;
use ledger_core::{
    account::AccountKind,
    directory::{Authorizer, Role, RoleTable},
    observer::{AccountObserver, LogNotifier},
    scheduler::TickOutcome,
    DepositSplit, Ledger, LedgerConfig, RecurringTransaction, Transaction,
};
use rust_decimal_macros::dec;
use std::{env, sync::Arc, thread, time::Duration};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ticks = parse_arg(&args, "--ticks", 5u64);
    let period_ms = parse_arg(&args, "--period-ms", 200u64);
    let recent = parse_arg(&args, "--recent", 10usize);
    let config_path = args
        .windows(2)
        .find(|w| w[0] == "--config")
        .map(|w| w[1].as_str());

    let config = match config_path {
        Some(path) => LedgerConfig::load(path)?,
        None => LedgerConfig::default(),
    };

    println!("ledger-runner");
    println!("  config:     {}", config_path.unwrap_or("(defaults)"));
    println!("  auto limit: {}", config.approval.auto_limit);
    println!("  mgr limit:  {}", config.approval.manager_limit);
    println!("  ticks:      {ticks}");
    println!("  period:     {period_ms}ms");
    println!();

    let ledger = Ledger::build(config);
    let notifier: Arc<dyn AccountObserver> = Arc::new(LogNotifier);

    let alice = ledger.accounts().open(Some("acc-alice"), "Alice", AccountKind::Savings, dec!(1000))?;
    let bob = ledger.accounts().open(Some("acc-bob"), "Bob", AccountKind::Checking, dec!(0))?;
    let carol = ledger.accounts().open(Some("acc-carol"), "Carol", AccountKind::Savings, dec!(50))?;
    let loan = ledger.accounts().open(Some("loan-dave"), "Dave", AccountKind::Loan, dec!(2000))?;
    for account in ledger.accounts().all() {
        account.add_observer(Arc::clone(&notifier));
    }

    let roles = RoleTable::new();
    roles.register("teller-1", Role::Teller);
    roles.register("manager-1", Role::Manager);

    // ── Ad-hoc transactions ─────────────────────────────────────────
    let submissions = [
        ("teller-1", Role::Teller, Transaction::transfer(&alice, &bob, dec!(300))),
        ("manager-1", Role::Manager, Transaction::transfer(&alice, &bob, dec!(500))),
        ("teller-1", Role::Teller, Transaction::transfer(&alice, &bob, dec!(5000))),
        ("teller-1", Role::Teller, Transaction::withdraw(&bob, dec!(0))),
        ("teller-1", Role::Teller, Transaction::transfer(&alice, &loan, dec!(150))),
        ("teller-1", Role::Teller, Transaction::withdraw(&loan, dec!(50))),
        ("nobody", Role::Customer, Transaction::deposit(&alice, dec!(10))),
    ];
    let mut accepted = 0usize;
    let mut refused = 0usize;
    for (user, role, tx) in &submissions {
        if !roles.authorize(user, *role) {
            log::warn!("{user} is not authorized as {role:?}; {tx} not submitted");
            refused += 1;
            continue;
        }
        if ledger.process(tx) {
            accepted += 1;
        } else {
            refused += 1;
        }
    }

    // A frozen account refuses outgoing money.
    alice.freeze();
    if !ledger.process(&Transaction::withdraw(&alice, dec!(10))) {
        refused += 1;
    }
    alice.reopen();

    // ── Group deposit ───────────────────────────────────────────────
    let family = ledger
        .accounts()
        .create_group(Some("grp-family"), "Family", DepositSplit::Even)?;
    ledger.accounts().add_to_group("grp-family", "acc-alice")?;
    ledger.accounts().add_to_group("grp-family", "acc-bob")?;
    if let Err(e) = family.deposit(dec!(100)) {
        log::warn!("group deposit refused: {e}");
    }

    // ── Recurring payment ───────────────────────────────────────────
    // Carol starts short of funds; she is topped up halfway through.
    let period = Duration::from_millis(period_ms.max(1));
    let handle = ledger.schedule_recurring(
        RecurringTransaction::transfer(&carol, &bob, dec!(100)),
        period,
        period,
    )?;

    let top_up_at = ticks / 2;
    for tick in 0..ticks {
        if tick == top_up_at {
            ledger.process(&Transaction::deposit(&carol, dec!(200)));
        }
        thread::sleep(period);
    }

    // One extra tick on this thread, then stop the schedule.
    let last = ledger.scheduler().run_tick(&handle);
    if !matches!(last, TickOutcome::Inactive) {
        log::info!("final manual tick: {last:?}");
    }
    handle.cancel();
    ledger.shutdown();

    print_summary(&ledger, accepted, refused, ticks);

    println!();
    println!("=== RECENT AUDIT ENTRIES ===");
    ledger.audit_log().print_recent(recent);
    Ok(())
}

fn print_summary(ledger: &Ledger, accepted: usize, refused: usize, ticks: u64) {
    let audit = ledger.audit_log();

    println!("=== RUN SUMMARY ===");
    println!("  ticks slept:     {ticks}");
    println!("  ad-hoc accepted: {accepted}");
    println!("  ad-hoc refused:  {refused}");
    println!("  executed:        {}", audit.count_action("EXECUTED"));
    println!("  rejected:        {}", audit.count_action("REJECTED"));
    println!("  failed:          {}", audit.count_prefix("FAILED"));
    println!("  skipped:         {}", audit.count_prefix("SKIPPED_"));
    println!("  cancelled:       {}", audit.count_prefix("CANCELLED"));
    println!("  audit entries:   {}", audit.entries_count());
    println!("  active jobs:     {}", ledger.scheduler().active_count());

    println!();
    println!("=== ACCOUNTS ===");
    for account in ledger.accounts().all() {
        let snap = account.snapshot();
        println!(
            "  {:<10} {:<6} {:<10} balance {:>10.2}  available {:>10.2}",
            snap.id, snap.name, snap.state, snap.balance, snap.available_balance
        );
    }
    for group in ledger.accounts().groups() {
        println!(
            "  {:<10} group  {:<10} balance {:>10.2}  members {}",
            group.id(),
            group.state(),
            group.balance(),
            group.len()
        );
    }
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
