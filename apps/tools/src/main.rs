use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use server_api::{import_moment, ApiContext};
use shared::domain::{UserId, VisionId, ALLIES_GROUP};
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/visions.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or refresh a user (upserts on username).
    CreateUser {
        username: String,
        full_name: String,
        #[arg(long)]
        avatar_url: Option<String>,
        /// Keep the user off the home rails.
        #[arg(long)]
        hidden: bool,
    },
    /// Flag or unflag a vision for the home carousel.
    SetFeatured { vision_id: i64, featured: bool },
    AddGroup { user_id: i64, group: String },
    RemoveGroup { user_id: i64, group: String },
    /// Import a moment from a bare tweet id, or from a tweet JSON file.
    ImportMoment {
        tweet: String,
        /// Treat TWEET as a path to a JSON file.
        #[arg(long)]
        file: bool,
    },
    /// Load a small fixture set to browse.
    SeedDemo,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::CreateUser {
            username,
            full_name,
            avatar_url,
            hidden,
        } => {
            let user_id = storage
                .create_user(&username, &full_name, avatar_url.as_deref())
                .await?;
            if hidden {
                storage.set_visible_on_home(user_id, false).await?;
            }
            println!("created user_id={}", user_id.0);
        }
        Command::SetFeatured {
            vision_id,
            featured,
        } => {
            let updated = storage.set_featured(VisionId(vision_id), featured).await?;
            anyhow::ensure!(updated, "no vision with id {vision_id}");
            println!("vision {vision_id} featured={featured}");
        }
        Command::AddGroup { user_id, group } => {
            storage.add_user_to_group(UserId(user_id), &group).await?;
            println!("user {user_id} joined {group}");
        }
        Command::RemoveGroup { user_id, group } => {
            storage
                .remove_user_from_group(UserId(user_id), &group)
                .await?;
            println!("user {user_id} left {group}");
        }
        Command::ImportMoment { tweet, file } => {
            let value = if file {
                let raw = std::fs::read_to_string(&tweet).with_context(|| format!("reading {tweet}"))?;
                serde_json::from_str(&raw).context("tweet file is not valid JSON")?
            } else {
                serde_json::Value::String(tweet)
            };
            let api = ApiContext { storage };
            let moment = import_moment(&api, &value).await?;
            println!(
                "imported moment_id={} tweet_id={}",
                moment.id.0,
                moment.tweet_id.as_deref().unwrap_or("-")
            );
        }
        Command::SeedDemo => seed_demo(&storage).await?,
    }

    Ok(())
}

async fn seed_demo(storage: &Storage) -> Result<()> {
    let maya = storage.create_user("maya", "Maya Reyes", None).await?;
    let theo = storage.create_user("theo", "Theo Okafor", None).await?;
    let june = storage.create_user("june", "June Park", None).await?;
    storage.add_user_to_group(theo, ALLIES_GROUP).await?;

    let groundbreaking = storage
        .upsert_moment_by_tweet_id(
            "420000001",
            "cityhall",
            "Breaking ground on the new riverfront path today.",
            Some("https://pbs.example.org/riverfront.jpg"),
        )
        .await?;

    let riverfront = storage
        .create_vision(
            maya,
            Some("parks"),
            "A greener riverfront with space to walk, bike and breathe.",
            Some(groundbreaking),
        )
        .await?;
    let transit = storage
        .create_vision(
            theo,
            Some("transit"),
            "Late-night transit so shift workers can get home safely.",
            None,
        )
        .await?;
    storage
        .create_vision(
            june,
            Some("economy"),
            "Pop-up markets in the empty storefronts downtown.",
            None,
        )
        .await?;

    storage.set_featured(riverfront, true).await?;
    storage.add_supporter(riverfront, theo).await?;
    storage.add_supporter(riverfront, june).await?;
    storage.add_supporter(transit, maya).await?;
    storage
        .create_reply(riverfront, june, "Count me in for the cleanup days.")
        .await?;
    storage
        .create_reply(transit, maya, "This would change my commute.")
        .await?;

    println!("seeded 3 users, 3 visions, 1 moment");
    Ok(())
}
