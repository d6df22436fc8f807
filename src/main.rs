use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

use swimschool_progress::catalog::Catalog;
use swimschool_progress::models::{CounterChange, CounterPatch, StudentKey};
use swimschool_progress::store::ProgressStore;
use swimschool_progress::{badges, config, db, logging, progress, recommend, report};

#[derive(Parser)]
#[command(name = "swimschool-progress")]
#[command(about = "Skill progress, recommendations and badges for swim school students", long_about = None)]
struct Cli {
    /// Swim school the students belong to
    #[arg(long, global = true, default_value = "default")]
    tenant: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo students
    Seed,
    /// List catalog skills and badges
    Catalog,
    /// Record a coach assessment of one skill
    Assess {
        #[arg(long)]
        student: String,
        #[arg(long)]
        skill: String,
        #[arg(long)]
        level: u8,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Import assessments from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Show every catalog skill with the student's status
    Matrix {
        #[arg(long)]
        student: String,
    },
    /// Show overall completion and suggested level
    Level {
        #[arg(long)]
        student: String,
    },
    /// Suggest up to three skills to focus on next
    Recommend {
        #[arg(long)]
        student: String,
    },
    /// Record lesson attendance
    Attend {
        #[arg(long)]
        student: String,
        #[arg(long)]
        early: bool,
        #[arg(long, default_value_t = 0)]
        distance: u32,
    },
    /// Set badge counters directly
    Counters(CountersArgs),
    /// Roll the student's week over and set this week's schedule
    StartWeek {
        #[arg(long)]
        student: String,
        #[arg(long)]
        scheduled: u32,
    },
    /// Check whether a badge can be awarded
    CheckBadge {
        #[arg(long)]
        student: String,
        #[arg(long)]
        badge: String,
    },
    /// Award a badge
    Award {
        #[arg(long)]
        student: String,
        #[arg(long)]
        badge: String,
    },
    /// Award every badge the student qualifies for
    EvaluateBadges {
        #[arg(long)]
        student: String,
    },
    /// Generate a markdown progress report
    Report {
        #[arg(long)]
        student: String,
        #[arg(long, default_value = "progress-report.md")]
        out: PathBuf,
    },
}

#[derive(Args)]
struct CountersArgs {
    #[arg(long)]
    student: String,
    #[arg(long)]
    lessons_attended: Option<u32>,
    #[arg(long)]
    consecutive_weeks: Option<u32>,
    #[arg(long)]
    distance: Option<u32>,
    #[arg(long)]
    early_check_ins: Option<u32>,
    #[arg(long)]
    scheduled_this_week: Option<u32>,
    #[arg(long)]
    attended_this_week: Option<u32>,
    #[arg(long)]
    referrals: Option<u32>,
    #[arg(long)]
    equipment_purchases: Option<u32>,
    /// Stroke level as stroke=level, repeatable
    #[arg(long = "stroke", value_parser = parse_stroke_level)]
    strokes: Vec<(String, u8)>,
}

impl CountersArgs {
    fn patch(&self) -> CounterPatch {
        CounterPatch {
            lessons_attended_count: self.lessons_attended,
            consecutive_weeks_present: self.consecutive_weeks,
            stroke_levels: self.strokes.iter().cloned().collect(),
            total_distance_meters: self.distance,
            early_check_ins: self.early_check_ins,
            lessons_scheduled_this_week: self.scheduled_this_week,
            lessons_attended_this_week: self.attended_this_week,
            referral_count: self.referrals,
            equipment_purchases: self.equipment_purchases,
        }
    }
}

fn parse_stroke_level(value: &str) -> Result<(String, u8), String> {
    let (stroke, level) = value
        .split_once('=')
        .ok_or_else(|| format!("expected stroke=level, got {value}"))?;
    let level: u8 = level
        .parse()
        .map_err(|_| format!("invalid level in {value}"))?;
    if stroke.is_empty() || !(1..=5).contains(&level) {
        return Err(format!("expected a stroke name and a level 1-5, got {value}"));
    }
    Ok((stroke.to_string(), level))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::Config::from_env();
    logging::init_tracing(&config.log_level);

    let catalog =
        Catalog::load(config.catalog_path.as_deref()).context("failed to load catalog")?;

    if matches!(cli.command, Commands::Catalog) {
        print_catalog(&catalog);
        return Ok(());
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(config.require_database_url()?)
        .await
        .context("failed to connect to Postgres")?;

    if matches!(cli.command, Commands::InitDb) {
        db::init_db(&pool).await?;
        println!("Schema ready.");
        return Ok(());
    }

    let store = db::PgStore::new(pool);
    run(cli.command, &cli.tenant, &store, &catalog).await
}

async fn run(
    command: Commands,
    tenant: &str,
    store: &dyn ProgressStore,
    catalog: &Catalog,
) -> anyhow::Result<()> {
    let key = |student: &str| StudentKey::new(tenant, student);

    match command {
        Commands::InitDb | Commands::Catalog => {}
        Commands::Seed => {
            db::seed(store, tenant).await?;
            println!("Seed data inserted.");
        }
        Commands::Assess {
            student,
            skill,
            level,
            notes,
        } => {
            let record = progress::update_skill_progress(
                store,
                catalog,
                &key(&student),
                &skill,
                level,
                notes.as_deref(),
                Utc::now(),
            )
            .await?;
            println!(
                "{} on {}: level {} after {} attempts.",
                student, record.skill_id, record.current_level, record.attempts
            );
        }
        Commands::Import { csv } => {
            let applied = progress::import_assessments(store, catalog, tenant, &csv).await?;
            println!("Applied {applied} assessments from {}.", csv.display());
        }
        Commands::Matrix { student } => {
            let matrix = progress::get_student_skill_matrix(store, catalog, &key(&student)).await?;
            for item in &matrix {
                let detail = match &item.progress {
                    Some(record) => format!(
                        "level {}/5, {} attempts, last {}",
                        record.current_level,
                        record.attempts,
                        record.last_assessed.date_naive()
                    ),
                    None => "-".to_string(),
                };
                println!(
                    "{:<12} {:<22} {} [{}, tier {}] {}",
                    item.status.label(),
                    item.skill.id,
                    item.skill.name,
                    item.skill.category.label(),
                    item.skill.level,
                    detail
                );
            }
        }
        Commands::Level { student } => {
            let stats = progress::calculate_overall_level(store, catalog, &key(&student)).await?;
            println!(
                "{student}: {}% ({} of {} levels), suggested level {}",
                stats.overall_percentage,
                stats.earned_levels,
                stats.total_levels,
                stats.suggested_level
            );
        }
        Commands::Recommend { student } => {
            let skills =
                recommend::get_skill_recommendations(store, catalog, &key(&student)).await?;
            if skills.is_empty() {
                println!("Nothing left to recommend.");
                return Ok(());
            }
            println!("Next focus for {student}:");
            for skill in skills {
                println!(
                    "- {} ({}, level {})",
                    skill.name,
                    skill.category.label(),
                    skill.level
                );
            }
        }
        Commands::Attend {
            student,
            early,
            distance,
        } => {
            let counters = store
                .apply_counter_change(
                    &key(&student),
                    &CounterChange::Attendance {
                        early_check_in: early,
                        distance_meters: distance,
                    },
                )
                .await?;
            println!(
                "{student} has attended {} lessons ({}m total).",
                counters.lessons_attended_count, counters.total_distance_meters
            );
        }
        Commands::Counters(args) => {
            let change = CounterChange::Patch(args.patch());
            let counters = store
                .apply_counter_change(&key(&args.student), &change)
                .await?;
            println!("{}", serde_json::to_string_pretty(&counters)?);
        }
        Commands::StartWeek { student, scheduled } => {
            let counters = store
                .apply_counter_change(&key(&student), &CounterChange::StartWeek { scheduled })
                .await?;
            println!(
                "{student}: {} consecutive weeks, {} lessons scheduled this week.",
                counters.consecutive_weeks_present, counters.lessons_scheduled_this_week
            );
        }
        Commands::CheckBadge { student, badge } => {
            let eligible =
                badges::check_badge_eligibility(store, catalog, &key(&student), &badge).await?;
            if eligible {
                println!("{student} is eligible for {badge}.");
            } else {
                println!("{student} is not eligible for {badge}.");
            }
        }
        Commands::Award { student, badge } => {
            if badges::award_badge(store, catalog, &key(&student), &badge).await? {
                println!("Awarded {badge} to {student}.");
            } else {
                println!("{student} already has {badge}.");
            }
        }
        Commands::EvaluateBadges { student } => {
            let awarded = badges::evaluate_badges(store, catalog, &key(&student)).await?;
            if awarded.is_empty() {
                println!("No new badges for {student}.");
            }
            for badge in awarded {
                println!("Awarded {} {} to {student}.", badge.icon, badge.name);
            }
        }
        Commands::Report { student, out } => {
            let key = key(&student);
            let matrix = progress::get_student_skill_matrix(store, catalog, &key).await?;
            let stats = progress::overall_stats(&matrix);
            let recommendations = recommend::recommend_from_matrix(&matrix);
            let counters = store.get_or_create_counters(&key).await?;
            let recent = store.recent_assessments(&key, 20).await?;

            let report = report::build_report(&report::ReportInput {
                student: &student,
                catalog,
                matrix: &matrix,
                stats: &stats,
                recommendations: &recommendations,
                counters: &counters,
                recent: &recent,
            });
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

fn print_catalog(catalog: &Catalog) {
    println!("Catalog version {}", catalog.version);
    println!();
    println!("Skills:");
    for skill in &catalog.skills {
        println!(
            "- {:<22} {} [{}, level {}]",
            skill.id,
            skill.name,
            skill.category.label(),
            skill.level
        );
    }
    println!();
    println!("Badges:");
    for badge in &catalog.badges {
        println!(
            "- {:<20} {} {}: {}",
            badge.id, badge.icon, badge.name, badge.requirement
        );
    }
}
