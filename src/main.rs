//! forester CLI - version-control for 3D-asset projects

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use forester::ops::{
    apply_stash, checkout, commit, create_branch, create_tag, delete_branch, delete_stash,
    delete_tag, gc, list_branches, list_stashes, list_tags, log, rebuild, show, show_tag,
    stash_changes, status, switch_branch, CheckoutOptions, CommitOptions,
};
use forester::{Error, Repo};

#[derive(Parser)]
#[command(name = "forester")]
#[command(about = "content-addressed version control for 3D-asset projects")]
#[command(version)]
struct Cli {
    /// working directory (defaults to the current directory)
    #[arg(short = 'C', long, default_value = ".")]
    directory: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// initialize a new repository
    Init {
        /// path to initialize
        #[arg(default_value = ".")]
        path: PathBuf,

        /// re-initialize over an existing repository
        #[arg(long)]
        force: bool,
    },

    /// record a snapshot of the working set
    Commit {
        /// commit message
        #[arg(short, long)]
        message: String,

        /// author name (defaults to the configured author)
        #[arg(short, long)]
        author: Option<String>,

        /// skip the pre-commit hook
        #[arg(long)]
        no_verify: bool,
    },

    /// show one commit in detail
    Show {
        /// commit hash (may be abbreviated)
        hash: String,

        /// list every file of the commit
        #[arg(long)]
        full: bool,
    },

    /// show commit history
    Log {
        /// branch to log (defaults to HEAD)
        branch: Option<String>,

        /// include tree and parent hashes
        #[arg(short, long)]
        verbose: bool,
    },

    /// manage branches
    Branch {
        #[command(subcommand)]
        command: BranchCommands,
    },

    /// reconstruct the working directory from a commit
    Checkout {
        /// branch name or commit hash (may be abbreviated)
        target: String,

        /// discard uncommitted changes
        #[arg(long)]
        force: bool,

        /// skip the pre-checkout hook
        #[arg(long)]
        no_verify: bool,

        /// materialize only paths matching these globs
        #[arg(long = "path")]
        file_patterns: Vec<String>,

        /// materialize only meshes with these object names
        #[arg(long = "mesh")]
        mesh_names: Vec<String>,
    },

    /// manage stashes
    Stash {
        #[command(subcommand)]
        command: StashCommands,
    },

    /// manage tags
    Tag {
        #[command(subcommand)]
        command: TagCommands,
    },

    /// show working-set changes against HEAD
    Status,

    /// rebuild the metadata index from stored objects
    Rebuild {
        /// skip the database backup
        #[arg(long)]
        no_backup: bool,
    },

    /// remove unreachable objects
    Gc {
        /// only report what would be removed
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum BranchCommands {
    /// list branches
    List,
    /// create a branch
    Create {
        name: String,
        /// source branch (defaults to the current one)
        #[arg(long)]
        from: Option<String>,
    },
    /// point HEAD at another branch
    Switch { name: String },
    /// delete a branch
    Delete {
        name: String,
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum StashCommands {
    /// stash the dirty working set
    Create {
        #[arg(short, long)]
        message: Option<String>,
    },
    /// list stashes
    List,
    /// check a stash out into the working directory
    Apply {
        hash: String,
        #[arg(long)]
        force: bool,
    },
    /// drop a stash record
    Delete { hash: String },
}

#[derive(Subcommand)]
enum TagCommands {
    /// create a tag
    Create {
        name: String,
        /// target commit (defaults to the HEAD tip)
        hash: Option<String>,
    },
    /// list tags
    List,
    /// show a tag's commit
    Show { name: String },
    /// delete a tag
    Delete { name: String },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // clap prints its own help/version output
            let _ = e.print();
            return match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    ExitCode::SUCCESS
                }
                _ => ExitCode::from(1),
            };
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(exit_code(&e))
        }
    }
}

/// map error kinds onto the documented exit codes
fn exit_code(error: &Error) -> u8 {
    match error {
        Error::HookRejected { .. } | Error::Timeout(_) => 3,
        Error::LockedFiles(_) | Error::LockContention => 4,
        _ => 2,
    }
}

fn run(cli: Cli) -> forester::Result<()> {
    if let Commands::Init { path, force } = &cli.command {
        Repo::init(path, *force)?;
        println!("initialized forester repository at {}", path.display());
        return Ok(());
    }

    let repo = Repo::discover(&cli.directory)?;

    match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),

        Commands::Commit {
            message,
            author,
            no_verify,
        } => {
            let opts = CommitOptions {
                no_verify,
                ..Default::default()
            };
            match commit(&repo, &message, author.as_deref(), &opts)? {
                Some(hash) => println!("{hash}"),
                None => println!("no changes"),
            }
        }

        Commands::Show { hash, full } => {
            let info = show(&repo, &hash)?;
            println!("commit {}", info.hash);
            println!("Author:  {}", info.record.author);
            println!("Branch:  {}", info.record.branch);
            println!("Date:    {}", info.record.timestamp);
            println!("Type:    {}", info.record.commit_type.as_str());
            if let Some(parent) = info.record.parent {
                println!("Parent:  {parent}");
            }
            println!();
            for line in info.record.message.lines() {
                println!("    {line}");
            }
            if full {
                println!();
                for file in &info.files {
                    println!("{}\t{}\t{}", file.kind.as_str(), file.hash, file.path);
                }
            }
        }

        Commands::Log { branch, verbose } => {
            for entry in log(&repo, branch.as_deref(), None)? {
                print!("{entry}");
                if verbose {
                    println!("Tree:   {}", entry.record.tree);
                    if let Some(parent) = entry.record.parent {
                        println!("Parent: {parent}");
                    }
                }
                println!();
            }
        }

        Commands::Branch { command } => match command {
            BranchCommands::List => {
                for branch in list_branches(&repo)? {
                    let marker = if branch.is_current { "*" } else { " " };
                    let tip = branch
                        .tip
                        .map(|h| h.short())
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{} {} {} ({} commits)",
                        marker, branch.name, tip, branch.commit_count
                    );
                }
            }
            BranchCommands::Create { name, from } => {
                create_branch(&repo, &name, from.as_deref())?;
                println!("created branch {name}");
            }
            BranchCommands::Switch { name } => {
                switch_branch(&repo, &name)?;
                println!("switched to {name}");
            }
            BranchCommands::Delete { name, force } => {
                delete_branch(&repo, &name, force)?;
                println!("deleted branch {name}");
            }
        },

        Commands::Checkout {
            target,
            force,
            no_verify,
            file_patterns,
            mesh_names,
        } => {
            let opts = CheckoutOptions {
                force,
                no_verify,
                file_patterns: (!file_patterns.is_empty()).then_some(file_patterns),
                mesh_names: (!mesh_names.is_empty()).then_some(mesh_names),
            };
            let hash = checkout(&repo, &target, &opts)?;
            println!("checked out {hash}");
        }

        Commands::Stash { command } => match command {
            StashCommands::Create { message } => {
                match stash_changes(&repo, message.as_deref())? {
                    Some(hash) => println!("{hash}"),
                    None => println!("no changes"),
                }
            }
            StashCommands::List => {
                for stash in list_stashes(&repo)? {
                    println!(
                        "{} {} ({})",
                        stash.hash.short(),
                        stash.message,
                        stash.author
                    );
                }
            }
            StashCommands::Apply { hash, force } => {
                let applied = apply_stash(&repo, &hash, force)?;
                println!("applied {applied}");
            }
            StashCommands::Delete { hash } => {
                delete_stash(&repo, &hash)?;
                println!("deleted stash");
            }
        },

        Commands::Tag { command } => match command {
            TagCommands::Create { name, hash } => {
                create_tag(&repo, &name, hash.as_deref())?;
                println!("created tag {name}");
            }
            TagCommands::List => {
                for (name, hash) in list_tags(&repo)? {
                    println!("{} {}", name, hash.short());
                }
            }
            TagCommands::Show { name } => {
                println!("{}", show_tag(&repo, &name)?);
            }
            TagCommands::Delete { name } => {
                delete_tag(&repo, &name)?;
                println!("deleted tag {name}");
            }
        },

        Commands::Status => {
            let s = status(&repo)?;
            if s.is_clean() {
                println!("working directory clean");
            } else {
                for path in &s.added {
                    println!("added:    {path}");
                }
                for path in &s.modified {
                    println!("modified: {path}");
                }
                for path in &s.deleted {
                    println!("deleted:  {path}");
                }
            }
        }

        Commands::Rebuild { no_backup } => {
            let stats = rebuild(&repo, !no_backup)?;
            println!(
                "rebuilt: {} commits, {} stashes, {} branches, {} meshes, {} textures",
                stats.commits, stats.stashes, stats.branches, stats.meshes, stats.textures
            );
        }

        Commands::Gc { dry_run } => {
            let stats = gc(&repo, dry_run)?;
            let verb = if dry_run { "would remove" } else { "removed" };
            println!(
                "{} {} objects ({} blobs, {} trees, {} commits, {} meshes, {} textures, {} stashes), {} bytes",
                verb,
                stats.total_deleted(),
                stats.blobs_deleted,
                stats.trees_deleted,
                stats.commits_deleted,
                stats.meshes_deleted,
                stats.textures_deleted,
                stats.stashes_deleted,
                stats.bytes_freed
            );
        }
    }

    Ok(())
}
