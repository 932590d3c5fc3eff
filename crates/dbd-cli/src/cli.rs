use dbd::{ArgumentSource, Mode};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub enum Command {
    Help,
    Version,
    Run(RunArgs),
}

/// Everything given on the command line, before environment defaults are applied.
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub mode: Option<Mode>,
    pub driver: Option<String>,
    pub params: Option<String>,
    pub output: Option<PathBuf>,
    pub arguments: Vec<ArgumentSource>,
    pub column_separator: Option<String>,
    pub line_separator: Option<String>,
    pub no_end_of_line: bool,
    pub header: bool,
    pub encoding: Option<String>,
    pub positionals: Vec<String>,
}

impl RunArgs {
    fn set_mode(&mut self, mode: Mode) -> anyhow::Result<()> {
        match self.mode {
            Some(existing) if existing != mode => anyhow::bail!(
                "only one of --escape, --table, --select, or --query may be specified \
                 (got --{existing} and --{mode})"
            ),
            _ => {
                self.mode = Some(mode);
                Ok(())
            }
        }
    }
}

/// Short flags that take a value, which may be attached (`-afoo`).
const SHORT_WITH_VALUE: &[&str] = &["-o", "-d", "-p", "-a", "-f", "-c", "-l", "-x"];

/// Split `--name=value` or `-Xvalue` into its parts.
fn split_inline(token: &str) -> (&str, Option<&str>) {
    if token.starts_with("--") {
        return match token.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (token, None),
        };
    }
    match token.get(..2) {
        Some(flag) if token.len() > 2 && SHORT_WITH_VALUE.contains(&flag) => {
            (flag, Some(&token[2..]))
        }
        _ => (token, None),
    }
}

pub fn parse_args(args: &[String]) -> anyhow::Result<Command> {
    let mut it = args.iter().skip(1).map(String::as_str);
    let mut run = RunArgs::default();

    while let Some(token) = it.next() {
        if token == "--" {
            run.positionals.extend(it.by_ref().map(str::to_string));
            break;
        }
        if token == "-" || !token.starts_with('-') {
            run.positionals.push(token.to_string());
            continue;
        }

        let (name, inline) = split_inline(token);
        let mut value = |flag: &str| -> anyhow::Result<String> {
            match inline {
                Some(v) => Ok(v.to_string()),
                None => match it.next() {
                    Some(v) => Ok(v.to_string()),
                    None => anyhow::bail!("{flag} requires a value"),
                },
            }
        };

        match name {
            "-h" | "--help" => return Ok(Command::Help),
            "-v" | "--version" => return Ok(Command::Version),
            "-e" | "--escape" => run.set_mode(Mode::Escape)?,
            "-t" | "--table" => run.set_mode(Mode::Table)?,
            "-s" | "--select" => run.set_mode(Mode::Select)?,
            "-q" | "--query" => run.set_mode(Mode::Query)?,
            "-o" | "--file-out" => run.output = Some(PathBuf::from(value("--file-out")?)),
            "-d" | "--driver" => run.driver = Some(value("--driver")?),
            "-p" | "--params" => run.params = Some(value("--params")?),
            "-a" | "--argument" => {
                let v = value("--argument")?;
                run.arguments.push(ArgumentSource::literal(v));
            }
            "-f" | "--file-argument" => {
                let v = value("--file-argument")?;
                run.arguments.push(ArgumentSource::file(&v));
            }
            "-z" | "--null-argument" => run.arguments.push(ArgumentSource::Null),
            "-c" | "--end-of-column" => run.column_separator = Some(value("--end-of-column")?),
            "-l" | "--end-of-line" => run.line_separator = Some(value("--end-of-line")?),
            "-n" | "--no-end-of-line" => run.no_end_of_line = true,
            "--header" => run.header = true,
            "-x" | "--encoding" => run.encoding = Some(value("--encoding")?),
            _ => anyhow::bail!("unknown option: {token}"),
        }

        let takes_value = SHORT_WITH_VALUE.contains(&name)
            || matches!(
                name,
                "--file-out"
                    | "--driver"
                    | "--params"
                    | "--argument"
                    | "--file-argument"
                    | "--end-of-column"
                    | "--end-of-line"
                    | "--encoding"
            );
        if inline.is_some() && !takes_value {
            anyhow::bail!("{name} does not take a value");
        }
    }

    Ok(Command::Run(run))
}

pub fn print_help() {
    println!(
        "\
dbd - run parameterized SQL from shell scripts

USAGE:
  dbd [OPTIONS] (-e|-t|-s|-q) -d <DRIVER> -p <PARAMS> <VALUE>...

MODES (exactly one):
  -e, --escape                  Escape each value for the given database
  -t, --table                   Select every row of each named table
  -s, --select                  Run each query and print its rows
  -q, --query                   Run one statement and print the affected row count;
                                exits 1 when no rows were changed

CONNECTION:
  -d, --driver <NAME>           Database driver: sqlite3, pgsql (default: $DBD_DRIVER)
  -p, --params <STR>            Connection parameters (default: $DBD_PARAMS)

ARGUMENTS (bound in order to the query placeholders):
  -a, --argument <VALUE>        Literal value
  -f, --file-argument <FILE>    Contents of FILE; `-` reads stdin
  -z, --null-argument           NULL

OUTPUT:
  -o, --file-out <FILE>         Write to FILE instead of stdout
  -c, --end-of-column <SEP>     Column separator (default: tab)
  -l, --end-of-line <SEP>       Line separator (default: newline)
  -n, --no-end-of-line          Omit the final line separator
      --header                  Print column names before the rows
  -x, --encoding <ENC>          none, echo (default), base64, base64url

  -h, --help                    Print help
  -v, --version                 Print version

PLACEHOLDERS:
  %d %u %f %hd %hu %hhd %hhu %ld %lu %lf %lld %llu   numbers
  %s                                                  text
  %pDt %pDi %pDd %pDa %pDs %pDz                       text, time, date, datetime,
                                                      timestamp, zoned timestamp
  %pDb %pDc %pDn                                      blob, clob, null
  %%                                                  literal percent

EXAMPLES:
  dbd -d sqlite3 -p app.db -s 'select * from users where id = %d' -a 42
  dbd -d sqlite3 -p app.db -q 'update files set data = %pDb where id = %d' -f - -a 7 < blob.bin
  dbd -d pgsql -p 'host=localhost dbname=app' -e \"john';drop table users\"

EXIT STATUS:
  0 success, 1 invalid arguments or no rows changed, 2 database or I/O failure

Diagnostics go to stderr; set DBD_LOG (e.g. DBD_LOG=dbd.sql=debug) for more."
    );
}

pub fn print_version() {
    println!("dbd {}", env!("CARGO_PKG_VERSION"));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(tokens: &[&str]) -> Vec<String> {
        std::iter::once("dbd")
            .chain(tokens.iter().copied())
            .map(str::to_string)
            .collect()
    }

    fn run_args(tokens: &[&str]) -> RunArgs {
        match parse_args(&args(tokens)).unwrap() {
            Command::Run(run) => run,
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn parse_select_with_arguments_in_order() {
        let run = run_args(&[
            "-d",
            "sqlite3",
            "--params=app.db",
            "-s",
            "select * from t where a = %d and b = %s and c = %s",
            "-a",
            "1",
            "-z",
            "--file-argument",
            "-",
        ]);

        assert_eq!(run.mode, Some(Mode::Select));
        assert_eq!(run.driver.as_deref(), Some("sqlite3"));
        assert_eq!(run.params.as_deref(), Some("app.db"));
        assert_eq!(
            run.arguments,
            vec![
                ArgumentSource::literal("1"),
                ArgumentSource::Null,
                ArgumentSource::file("-"),
            ]
        );
        assert_eq!(
            run.positionals,
            vec!["select * from t where a = %d and b = %s and c = %s"]
        );
    }

    #[test]
    fn parse_output_shaping() {
        let run = run_args(&[
            "-t",
            "users",
            "-c",
            ",",
            "--end-of-line=;",
            "-n",
            "--header",
            "-x",
            "base64",
            "-o",
            "out.txt",
        ]);
        assert_eq!(run.mode, Some(Mode::Table));
        assert_eq!(run.column_separator.as_deref(), Some(","));
        assert_eq!(run.line_separator.as_deref(), Some(";"));
        assert!(run.no_end_of_line);
        assert!(run.header);
        assert_eq!(run.encoding.as_deref(), Some("base64"));
        assert_eq!(run.output, Some(PathBuf::from("out.txt")));
    }

    #[test]
    fn double_dash_ends_options() {
        let run = run_args(&["-e", "--", "-a", "--header"]);
        assert_eq!(run.positionals, vec!["-a", "--header"]);
        assert!(run.arguments.is_empty());
        assert!(!run.header);
    }

    #[test]
    fn conflicting_modes_are_rejected() {
        let err = parse_args(&args(&["-s", "-q", "x"])).unwrap_err();
        assert!(err.to_string().contains("only one of"));
        // Repeating the same mode is harmless.
        assert_eq!(run_args(&["-s", "-s", "x"]).mode, Some(Mode::Select));
    }

    #[test]
    fn missing_value_and_unknown_option() {
        let err = parse_args(&args(&["-s", "x", "-a"])).unwrap_err();
        assert_eq!(err.to_string(), "--argument requires a value");
        let err = parse_args(&args(&["--bogus"])).unwrap_err();
        assert_eq!(err.to_string(), "unknown option: --bogus");
        let err = parse_args(&args(&["--header=yes"])).unwrap_err();
        assert_eq!(err.to_string(), "--header does not take a value");
    }

    #[test]
    fn help_and_version() {
        assert!(matches!(parse_args(&args(&["-s", "--help"])).unwrap(), Command::Help));
        assert!(matches!(parse_args(&args(&["-v"])).unwrap(), Command::Version));
    }

    #[test]
    fn short_flags_accept_attached_values() {
        let run = run_args(&[
            "-dsqlite3",
            "-papp.db",
            "-s",
            "select %s, %s",
            "-afoo",
            "-a-5",
            "-o/tmp/x",
            "-c,",
        ]);
        assert_eq!(run.driver.as_deref(), Some("sqlite3"));
        assert_eq!(run.params.as_deref(), Some("app.db"));
        assert_eq!(
            run.arguments,
            vec![ArgumentSource::literal("foo"), ArgumentSource::literal("-5")]
        );
        assert_eq!(run.output, Some(PathBuf::from("/tmp/x")));
        assert_eq!(run.column_separator.as_deref(), Some(","));

        let err = parse_args(&args(&["-sx"])).unwrap_err();
        assert_eq!(err.to_string(), "unknown option: -sx");
    }

    #[test]
    fn literal_argument_may_start_with_dash() {
        let run = run_args(&["-q", "update t set a = %d", "-a", "-5"]);
        assert_eq!(run.arguments, vec![ArgumentSource::literal("-5")]);
    }
}
