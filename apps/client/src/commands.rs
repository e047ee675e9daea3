//! Shell commands: one line of input parsed with clap and run against the API.

use crate::api::{ApiClient, Resource};
use crate::error::{ClientError, ClientErrorExt};
use clap::{Parser, Subcommand};
use keeper_domain::file::FileId;
use keeper_domain::secret::{Card, Credential, SecretId, TextNote};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "keeper", no_binary_name = true, disable_version_flag = true)]
pub struct Line {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create an account and sign in
    #[command(visible_alias = "registration")]
    Signup { login: String, password: String },
    /// Sign in to an existing account
    #[command(visible_alias = "login")]
    Signin { login: String, password: String },
    /// Forget the current session
    Logout,
    /// Login/password pairs
    #[command(subcommand)]
    Credential(CredentialCommand),
    /// Payment cards
    #[command(subcommand)]
    Card(CardCommand),
    /// Text notes
    #[command(subcommand)]
    Text(TextCommand),
    /// Binary files
    #[command(subcommand)]
    File(FileCommand),
    /// Leave the shell
    #[command(visible_alias = "quit")]
    Exit,
}

#[derive(Debug, Subcommand)]
pub enum CredentialCommand {
    List,
    Get { id: SecretId },
    Create { login: String, password: String },
    Update {
        id: SecretId,
        #[arg(long)]
        login: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    Delete { id: SecretId },
}

#[derive(Debug, Subcommand)]
pub enum CardCommand {
    List,
    Get { id: SecretId },
    /// Expiry is MM/YY
    Create { number: String, expired_at: String, cvv: String },
    Update {
        id: SecretId,
        #[arg(long)]
        number: Option<String>,
        #[arg(long)]
        expired_at: Option<String>,
        #[arg(long)]
        cvv: Option<String>,
    },
    Delete { id: SecretId },
}

#[derive(Debug, Subcommand)]
pub enum TextCommand {
    List,
    Get { id: SecretId },
    Create {
        #[arg(required = true, num_args = 1..)]
        words: Vec<String>,
    },
    Update {
        id: SecretId,
        #[arg(required = true, num_args = 1..)]
        words: Vec<String>,
    },
    Delete { id: SecretId },
}

#[derive(Debug, Subcommand)]
pub enum FileCommand {
    List,
    Get { id: FileId },
    /// Store the local file at PATH as NAME
    Upload { name: String, path: PathBuf },
    /// Save file ID into DIRECTORY
    Download { id: FileId, directory: PathBuf },
    Delete { id: FileId },
}

/// What the shell does after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

impl Line {
    /// Splits `input` on whitespace and parses it.
    ///
    /// # Errors
    /// The clap error, which also carries `help` output.
    pub fn parse_input(input: &str) -> Result<Self, clap::Error> {
        Self::try_parse_from(input.split_whitespace())
    }
}

/// Runs `command`, writing results to `out`.
///
/// # Errors
/// Whatever the server or the local filesystem reports.
pub async fn execute(api: &mut ApiClient, command: Command, out: &mut impl Write) -> Result<Flow, ClientError> {
    match command {
        Command::Signup { login, password } => {
            api.sign_up(&login, &password).await?;
            writeln!(out, "Signed up as {login}")?;
        },
        Command::Signin { login, password } => {
            api.sign_in(&login, &password).await?;
            writeln!(out, "Signed in as {login}")?;
        },
        Command::Logout => {
            api.sign_out();
            writeln!(out, "Signed out")?;
        },
        Command::Exit => return Ok(Flow::Exit),
        Command::Credential(cmd) => credential(api, cmd, out).await?,
        Command::Card(cmd) => card(api, cmd, out).await?,
        Command::Text(cmd) => text(api, cmd, out).await?,
        Command::File(cmd) => file(api, cmd, out).await?,
    }
    Ok(Flow::Continue)
}

async fn credential(api: &ApiClient, command: CredentialCommand, out: &mut impl Write) -> Result<(), ClientError> {
    match command {
        CredentialCommand::List => print(out, &api.list::<Credential>().await?),
        CredentialCommand::Get { id } => print(out, &api.get::<Credential>(id).await?),
        CredentialCommand::Create { login, password } => print(out, &api.create(&Credential { login, password }).await?),
        CredentialCommand::Update { id, login, password } => {
            if login.is_none() && password.is_none() {
                return Err(ClientError::usage("nothing to update; pass --login or --password"));
            }
            let updated = api
                .modify(id, |current: &mut Credential| {
                    replace(&mut current.login, login);
                    replace(&mut current.password, password);
                })
                .await?;
            print(out, &updated)
        },
        CredentialCommand::Delete { id } => removed::<Credential>(api, id, out).await,
    }
}

async fn card(api: &ApiClient, command: CardCommand, out: &mut impl Write) -> Result<(), ClientError> {
    match command {
        CardCommand::List => print(out, &api.list::<Card>().await?),
        CardCommand::Get { id } => print(out, &api.get::<Card>(id).await?),
        CardCommand::Create { number, expired_at, cvv } => print(out, &api.create(&Card { number, expired_at, cvv }).await?),
        CardCommand::Update { id, number, expired_at, cvv } => {
            if number.is_none() && expired_at.is_none() && cvv.is_none() {
                return Err(ClientError::usage("nothing to update; pass --number, --expired-at or --cvv"));
            }
            let updated = api
                .modify(id, |current: &mut Card| {
                    replace(&mut current.number, number);
                    replace(&mut current.expired_at, expired_at);
                    replace(&mut current.cvv, cvv);
                })
                .await?;
            print(out, &updated)
        },
        CardCommand::Delete { id } => removed::<Card>(api, id, out).await,
    }
}

async fn text(api: &ApiClient, command: TextCommand, out: &mut impl Write) -> Result<(), ClientError> {
    match command {
        TextCommand::List => print(out, &api.list::<TextNote>().await?),
        TextCommand::Get { id } => print(out, &api.get::<TextNote>(id).await?),
        TextCommand::Create { words } => print(out, &api.create(&TextNote { text: words.join(" ") }).await?),
        TextCommand::Update { id, words } => {
            let text = words.join(" ");
            print(out, &api.modify(id, |current: &mut TextNote| current.text = text).await?)
        },
        TextCommand::Delete { id } => removed::<TextNote>(api, id, out).await,
    }
}

async fn file(api: &ApiClient, command: FileCommand, out: &mut impl Write) -> Result<(), ClientError> {
    match command {
        FileCommand::List => print(out, &api.files().await?),
        FileCommand::Get { id } => print(out, &api.file(id).await?),
        FileCommand::Upload { name, path } => {
            api.upload(&name, &path).await?;
            writeln!(out, "Uploaded {name}")?;
            Ok(())
        },
        FileCommand::Download { id, directory } => {
            let saved = api.download(id, &directory).await?;
            writeln!(out, "Saved to {}", saved.display())?;
            Ok(())
        },
        FileCommand::Delete { id } => {
            api.delete_file(id).await?;
            writeln!(out, "Deleted file {id}")?;
            Ok(())
        },
    }
}

async fn removed<R: Resource>(api: &ApiClient, id: SecretId, out: &mut impl Write) -> Result<(), ClientError> {
    api.delete::<R>(id).await?;
    writeln!(out, "Deleted {id}")?;
    Ok(())
}

fn replace(field: &mut String, value: Option<String>) {
    if let Some(value) = value {
        *field = value;
    }
}

fn print(out: &mut impl Write, value: &impl Serialize) -> Result<(), ClientError> {
    let rendered = serde_json::to_string_pretty(value).context("Rendering the response")?;
    writeln!(out, "{rendered}")?;
    Ok(())
}
