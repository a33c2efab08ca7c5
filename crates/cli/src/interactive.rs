use std::io::{self, BufRead, Write};

/// Interactive prompt utilities for CLI commands
pub struct Prompt;

impl Prompt {
    /// Ask a yes/no question on the terminal with a default answer
    pub fn confirm(message: &str, default: bool) -> io::Result<bool> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        Self::confirm_with(&mut stdin.lock(), &mut stdout, message, default)
    }

    /// Ask a yes/no question on arbitrary streams
    ///
    /// Unrecognised answers repeat the question; end of input takes the default.
    pub fn confirm_with<R: BufRead, W: Write>(
        input: &mut R,
        output: &mut W,
        message: &str,
        default: bool,
    ) -> io::Result<bool> {
        let default_str = if default { "Y/n" } else { "y/N" };

        loop {
            write!(output, "{} [{}]: ", message, default_str)?;
            output.flush()?;

            let mut answer = String::new();
            if input.read_line(&mut answer)? == 0 {
                writeln!(output)?;
                return Ok(default);
            }

            match answer.trim().to_lowercase().as_str() {
                "" => return Ok(default),
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => writeln!(output, "Please enter 'y' or 'n'")?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn ask(answers: &str, default: bool) -> (bool, String) {
        let mut input = Cursor::new(answers.as_bytes().to_vec());
        let mut output = Vec::new();
        let answer = Prompt::confirm_with(&mut input, &mut output, "Create it?", default).unwrap();
        (answer, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_confirm_answers() {
        assert!(ask("y\n", false).0);
        assert!(ask("YES\n", false).0);
        assert!(!ask("n\n", true).0);
        assert!(ask("\n", true).0);
        assert!(!ask("\n", false).0);
    }

    #[test]
    fn test_confirm_repeats_on_garbage() {
        let (answer, output) = ask("maybe\ny\n", false);
        assert!(answer);
        assert_eq!(output.matches("Create it? [y/N]: ").count(), 2);
        assert!(output.contains("Please enter 'y' or 'n'"));
    }

    #[test]
    fn test_confirm_eof_takes_default() {
        assert!(!ask("", false).0);
    }
}
