//! Line-based shell around the client core: the terminal stand-in for the
//! browser page. Views render through their plain `Display` form.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{
    CivicClient, ClientConfig, Dispatch, Link, LinkAction, Modifiers, NavigateOptions,
};
use shared::domain::VisionId;

#[derive(Parser, Debug)]
struct Args {
    /// Base URL of the visions server.
    #[arg(long, default_value = "http://127.0.0.1:8780")]
    server_url: String,
    /// Sign in as this user before the first render.
    #[arg(long)]
    username: Option<String>,
    /// Site title used in every page title.
    #[arg(long, default_value = "Civic Visions")]
    site_title: String,
    /// Where sign-in links point.
    #[arg(long, default_value = "/login")]
    login_url: String,
}

enum Outcome {
    Continue,
    Quit,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let mut client = CivicClient::new(ClientConfig {
        server_url: args.server_url,
        login_url: args.login_url,
        site_title: args.site_title,
    });

    if let Some(username) = &args.username {
        let user = client.login(username, None).await?;
        println!("signed in as @{}", user.username);
    }

    client.start().await.context("first fetch failed")?;
    open(&mut client, "", NavigateOptions::default()).await?;

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        match run_command(&mut client, line.trim()).await {
            Ok(Outcome::Quit) => break,
            Ok(Outcome::Continue) => {}
            Err(err) => println!("error: {err:#}"),
        }
    }
    Ok(())
}

async fn run_command(client: &mut CivicClient, line: &str) -> Result<Outcome> {
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    match command {
        "" => {}
        "open" => open(client, rest, NavigateOptions::default()).await?,
        "click" => click(client, rest).await?,
        "login" => {
            let username = require(rest, "a username")?;
            let user = client.login(username, None).await?;
            println!("signed in as @{} ({})", user.username, client.session.user_status());
        }
        "new" => {
            let (category, text) = match rest.split_once(" -- ") {
                Some((category, text)) => (Some(category.trim()), text.trim()),
                None => (None, rest),
            };
            let category = category.filter(|c| !c.is_empty());
            let vision = client.create_vision(category, text, None).await?;
            println!("created vision #{}", vision.id.0);
        }
        "support" => {
            let vision = client.support(vision_id(rest)?).await?;
            println!("supporting #{} ({} supporters)", vision.id.0, vision.supporters.len());
        }
        "unsupport" => {
            let vision = client.unsupport(vision_id(rest)?).await?;
            println!("no longer supporting #{}", vision.id.0);
        }
        "share" => {
            let mut parts = rest.split_whitespace();
            let id = vision_id(parts.next().unwrap_or(""))?;
            let vision = client.share(id, parts.next()).await?;
            println!("shared #{}", vision.id.0);
        }
        "unshare" => {
            let vision = client.unshare(vision_id(rest)?).await?;
            println!("unshared #{}", vision.id.0);
        }
        "reply" => {
            let (id, text) = rest
                .split_once(char::is_whitespace)
                .context("usage: reply <id> <text>")?;
            let reply = client.reply(vision_id(id)?, text.trim()).await?;
            println!("replied to #{}: {}", reply.vision_id.0, reply.text);
        }
        "ally" => {
            let user = client.become_ally().await?;
            println!("@{} is now an ally", user.username);
        }
        "scroll" => {
            let offset = require(rest, "an offset")?
                .parse::<u32>()
                .context("offsets are whole numbers")?;
            client.record_scroll(offset);
        }
        "refresh" => {
            client.refresh().await?;
            println!(
                "refreshed: {} visions, {} users",
                client.visions.len().await,
                client.users.len().await
            );
        }
        "quit" | "exit" => return Ok(Outcome::Quit),
        "help" => usage(),
        _ => {
            println!("unknown command: {command}");
            usage();
        }
    }
    Ok(Outcome::Continue)
}

/// Navigates and renders, following the auth-gate redirect when the route
/// bounces somewhere else.
async fn open(client: &mut CivicClient, path: &str, options: NavigateOptions) -> Result<()> {
    let mut target = path.to_string();
    let mut options = options;
    loop {
        let navigation = client.navigate(&target, options)?;
        if let Some(offset) = navigation.restore_scroll {
            println!("(scroll to {offset})");
        }
        match client.dispatch(&navigation.route).await? {
            Dispatch::Show(view) => {
                println!("{view}");
                return Ok(());
            }
            Dispatch::Redirect { path } => {
                target = path;
                options = NavigateOptions::default();
            }
        }
    }
}

/// Runs the click policy the way the page's document handler did.
async fn click(client: &mut CivicClient, href: &str) -> Result<()> {
    let href = require(href, "an href")?;
    match client.link_action(&Link::new(href), &Modifiers::default()) {
        LinkAction::Navigate {
            path,
            noscroll,
            replace,
        } => {
            open(client, &path, NavigateOptions { noscroll, replace }).await?;
        }
        LinkAction::RequireSignIn { message } => println!("{message}"),
        LinkAction::PassThrough { auth_event } => match auth_event {
            Some("login") => println!("-> {}", client.login_url(None)),
            _ => println!("-> {href}"),
        },
    }
    Ok(())
}

fn vision_id(token: &str) -> Result<VisionId> {
    let id = require(token, "a vision id")?
        .parse::<i64>()
        .context("vision ids are numeric")?;
    Ok(VisionId(id))
}

fn require<'a>(token: &'a str, what: &str) -> Result<&'a str> {
    if token.is_empty() {
        anyhow::bail!("{what} is required");
    }
    Ok(token)
}

fn usage() {
    println!(
        "commands:\n  \
         open <path>          show a page (try: open visions/list)\n  \
         click <href>         follow a link the way the page would\n  \
         login <username>     sign in\n  \
         new [cat] -- <text>  create a vision\n  \
         support <id>         back a vision\n  \
         unsupport <id>       withdraw support\n  \
         share <id> [tweet]   share a vision\n  \
         unshare <id>         remove the share\n  \
         reply <id> <text>    reply to a vision\n  \
         ally                 join the allies\n  \
         scroll <n>           report the viewport offset\n  \
         refresh              re-fetch both collections\n  \
         quit"
    );
}
