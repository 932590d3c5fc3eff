mod cli;
mod config;
pub mod logging;

use config::RunConfig;
use dbd::{DbdError, EXIT_CALLER_ERROR, HandleCache};
use std::fs::File;
use std::io::{BufWriter, Write};

pub async fn run(args: Vec<String>) -> anyhow::Result<()> {
    match cli::parse_args(&args)? {
        cli::Command::Help => {
            cli::print_help();
            Ok(())
        }
        cli::Command::Version => {
            cli::print_version();
            Ok(())
        }
        cli::Command::Run(args) => execute(RunConfig::from_env(args)?).await,
    }
}

async fn execute(config: RunConfig) -> anyhow::Result<()> {
    let out: Box<dyn Write + Send> = match &config.output {
        Some(path) => {
            let file = File::create(path).map_err(|source| DbdError::OutputOpen {
                path: path.clone(),
                source,
            })?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(std::io::stdout())),
    };

    tracing::debug!(
        driver = %config.driver,
        mode = %config.request.mode,
        output = ?config.output,
        "connecting"
    );
    let mut driver = dbd::connect(&config.driver, &config.params).await?;
    let mut handles = HandleCache::new();
    dbd::run(driver.as_mut(), &config.request, &mut handles, out).await?;
    Ok(())
}

/// Process exit code for an error returned by [`run`].
///
/// Library errors carry their own code; anything else is a command-line error.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<DbdError>()
        .map_or(EXIT_CALLER_ERROR, DbdError::exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        let parse = anyhow::anyhow!("unknown option: --bogus");
        assert_eq!(exit_code(&parse), 1);

        let failure: anyhow::Error = DbdError::Connect {
            driver: "pgsql",
            message: "refused".into(),
        }
        .into();
        assert_eq!(exit_code(&failure), 2);

        let soft: anyhow::Error = DbdError::NoRowsChanged {
            query: "delete from t".into(),
        }
        .into();
        assert_eq!(exit_code(&soft), 1);
    }

    #[tokio::test]
    async fn writes_to_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let args: Vec<String> = [
            "dbd",
            "-d",
            "sqlite3",
            "-p",
            ":memory:",
            "-s",
            "select %d + 1, %s",
            "-a",
            "41",
            "-a",
            "x y",
            "-o",
            path.to_str().unwrap(),
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        run(args).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "42\tx y\n");
    }

    #[tokio::test]
    async fn unwritable_output_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.txt");
        let args: Vec<String> = [
            "dbd",
            "-d",
            "sqlite3",
            "-p",
            ":memory:",
            "-e",
            "x",
            "-o",
            path.to_str().unwrap(),
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let err = run(args).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DbdError>(),
            Some(DbdError::OutputOpen { .. })
        ));
        assert_eq!(exit_code(&err), 2);
    }
}
