use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "taskdash")]
#[command(about = "Task dashboard client with an AI assistant", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in and store the session
    Login {
        #[arg(long)]
        email: String,
        /// Read from TASKDASH_PASSWORD or prompted for when omitted
        #[arg(long, env = "TASKDASH_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Create an account
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// Read from TASKDASH_PASSWORD or prompted for when omitted
        #[arg(long, env = "TASKDASH_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Task operations
    Tasks {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Print the productivity summary the assistant sees
    Summary,
    /// Productivity analytics for a date window
    Analytics {
        /// today, last7days, thismonth or custom
        #[arg(short, long, default_value = "last7days")]
        window: String,
        /// First day of a custom window (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,
        /// Last day of a custom window (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,
    },
    /// Profile and account management
    Profile {
        #[command(subcommand)]
        command: Option<ProfileCommands>,
    },
    /// Talk to the assistant
    Chat {
        /// Send one message instead of starting an interactive session
        message: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// List all tasks
    List,
    /// Create a task
    Create {
        title: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Update fields of a task
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// todo, in-progress or done
        #[arg(long)]
        status: Option<String>,
    },
    /// Delete a task
    Delete { id: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ProfileCommands {
    /// Show the profile stored on the server
    Show,
    /// Change name or email
    Update {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Delete the account and sign out
    Delete,
    /// Change the account password
    ChangePassword {
        #[arg(long = "old", env = "TASKDASH_OLD_PASSWORD", hide_env_values = true)]
        old_password: Option<String>,
        #[arg(long = "new", env = "TASKDASH_NEW_PASSWORD", hide_env_values = true)]
        new_password: Option<String>,
    },
}
