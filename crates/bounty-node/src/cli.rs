use anyhow::{Context, Result};
use bounty_ledger::{ClientId, ReferralReset, RewardEngine, Section, TaskKey, UserId};
use clap::Subcommand;
use std::fmt::Write;

/// One-shot operator actions run against the state file.
#[derive(Debug, Clone, Subcommand)]
pub enum OperatorCommand {
    /// Add funds to a user's balance
    Credit { user: UserId, amount: f64 },

    /// Remove funds from a user's balance (floors at zero)
    Debit { user: UserId, amount: f64 },

    /// Show a user's balance
    Balance { user: UserId },

    /// Ban a user
    Ban { user: UserId },

    /// Lift a ban
    Unban { user: UserId },

    /// Drop a user's referral edge
    ResetReferral { user: UserId },

    /// Add a task to a section (watch, app, promo)
    AddTask {
        section: Section,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Remove the task at a 1-based position in a section
    RemoveTask { section: Section, position: usize },

    /// List tasks, optionally for one section
    Tasks { section: Option<Section> },

    /// Create a client campaign with one tracked task per URL
    AddClient {
        name: String,
        #[arg(required = true, num_args = 1..)]
        urls: Vec<String>,
    },

    /// Remove a client campaign and its tasks
    RemoveClient { client_id: ClientId },

    /// List submissions awaiting review
    Pending,

    /// Approve a task submission (`section:id`)
    ApproveSubmission { user: UserId, task: TaskKey },

    /// Reject a task submission (`section:id`)
    RejectSubmission { user: UserId, task: TaskKey },

    /// Approve a user's pending withdrawal
    ApproveWithdrawal { user: UserId },

    /// Reject a user's pending withdrawal and refund it
    RejectWithdrawal { user: UserId },

    /// Print a user's referral link
    Link { user: UserId },

    /// Show ledger statistics
    Stats,
}

/// Runs one operator command and renders its result as text.
pub async fn execute(engine: &RewardEngine, command: OperatorCommand) -> Result<String> {
    let output = match command {
        OperatorCommand::Credit { user, amount } => {
            let balance = engine.credit(user, amount).await?;
            format!("Credited {amount:.2} to {user}. Balance: {balance}")
        }
        OperatorCommand::Debit { user, amount } => {
            let debit = engine.debit(user, amount).await?;
            format!(
                "Removed {} from {user}. Balance: {}",
                debit.removed, debit.balance
            )
        }
        OperatorCommand::Balance { user } => {
            format!("{user}: {}", engine.balance(user).await)
        }
        OperatorCommand::Ban { user } => {
            if engine.ban(user).await? {
                format!("{user} banned")
            } else {
                format!("{user} was already banned")
            }
        }
        OperatorCommand::Unban { user } => {
            if engine.unban(user).await {
                format!("{user} unbanned")
            } else {
                format!("{user} was not banned")
            }
        }
        OperatorCommand::ResetReferral { user } => match engine.reset_referral(user).await {
            ReferralReset::Reset { previous_referrer } => {
                format!("Referral of {user} by {previous_referrer} reset")
            }
            ReferralReset::NotReferred => format!("{user} has no referral"),
        },
        OperatorCommand::AddTask { section, text } => {
            let task = engine.add_task(section, &text.join(" ")).await?;
            format!(
                "Added task {} \"{}\" to {}",
                task.id,
                task.title,
                section.display_name()
            )
        }
        OperatorCommand::RemoveTask { section, position } => {
            let index = position
                .checked_sub(1)
                .context("task positions start at 1")?;
            let task = engine.remove_task(section, index).await?;
            format!("Removed \"{}\" from {}", task.title, section.display_name())
        }
        OperatorCommand::Tasks { section } => {
            let sections = match section {
                Some(section) => vec![section],
                None => Section::ALL.to_vec(),
            };
            let mut out = String::new();
            for section in sections {
                let tasks = engine.tasks(section).await;
                writeln!(out, "{} ({})", section.display_name(), tasks.len())?;
                for (position, task) in tasks.iter().enumerate() {
                    let reward = task
                        .kind
                        .reward()
                        .map(|r| format!(" [{r}]"))
                        .unwrap_or_default();
                    writeln!(out, "  {}. {}{reward}", position + 1, task.title)?;
                }
            }
            out.trim_end().to_string()
        }
        OperatorCommand::AddClient { name, urls } => {
            let client = engine.create_client_task(&name, &urls).await?;
            let mut out = format!("Client {} ({}) created", client.name, client.client_id);
            for n in 1..=client.tracking_urls.len() {
                let link = engine.links().client(&client.client_id, &format!("link{n}"));
                write!(out, "\n  {link}")?;
            }
            out
        }
        OperatorCommand::RemoveClient { client_id } => {
            let removed = engine.remove_client_task(&client_id).await?;
            format!(
                "Removed client {} with {} task(s) and {} engagement(s)",
                removed.client.name,
                removed.removed_tasks.len(),
                removed.engagements
            )
        }
        OperatorCommand::Pending => {
            let pending = engine.pending_submissions().await;
            if pending.is_empty() {
                "No pending submissions".to_string()
            } else {
                let mut out = String::new();
                for (user, submission) in pending {
                    writeln!(out, "{user} {} \"{}\"", submission.task, submission.title)?;
                }
                out.trim_end().to_string()
            }
        }
        OperatorCommand::ApproveSubmission { user, task } => {
            let submission = engine.approve_submission(user, task).await?;
            format!("Approved \"{}\" for {user}", submission.title)
        }
        OperatorCommand::RejectSubmission { user, task } => {
            let submission = engine.reject_submission(user, task).await?;
            format!("Rejected \"{}\" for {user}", submission.title)
        }
        OperatorCommand::ApproveWithdrawal { user } => {
            let request = engine.approve_withdrawal(user).await?;
            format!(
                "Approved {} via {} to {}",
                request.final_amount,
                request.method.display_name(),
                request.payout_id
            )
        }
        OperatorCommand::RejectWithdrawal { user } => {
            let request = engine.reject_withdrawal(user).await?;
            format!("Rejected withdrawal for {user}, {} refunded", request.debited)
        }
        OperatorCommand::Link { user } => engine.referral_link(user),
        OperatorCommand::Stats => {
            let stats = engine.stats().await;
            format!(
                "Users: {} ({} active, {} banned)\n\
                 Balance held: {}\n\
                 Tasks: {} ({} client campaigns)\n\
                 Referrals: {}\n\
                 Pending submissions: {}\n\
                 Pending withdrawals: {}",
                stats.total_users,
                stats.active_users,
                stats.banned_users,
                stats.total_balance,
                stats.total_tasks,
                stats.client_tasks,
                stats.referrals,
                stats.pending_submissions,
                stats.pending_withdrawals
            )
        }
    };
    Ok(output)
}
