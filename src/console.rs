// 💬 Console decider - answer engine questions from a terminal
// Numbered options, `s` (or empty input) skips, EOF skips.

use crate::decision::{Choice, DecisionProvider, Question};
use std::io::{self, BufRead, Stdin, Stdout, Write};

const MAX_ATTEMPTS: usize = 3;

pub struct ConsoleDecider<R, W> {
    input: R,
    output: W,
}

impl ConsoleDecider<io::StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        let stdin: Stdin = io::stdin();
        ConsoleDecider::new(stdin.lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsoleDecider<R, W> {
    pub fn new(input: R, output: W) -> Self {
        ConsoleDecider { input, output }
    }

    fn prompt(&mut self, question: &Question, options: &[String]) -> io::Result<Choice> {
        writeln!(self.output, "\n{}", question)?;
        for (idx, option) in options.iter().enumerate() {
            writeln!(self.output, "  {}) {}", idx + 1, option)?;
        }

        for _ in 0..MAX_ATTEMPTS {
            write!(self.output, "choice [1-{}, s = skip]: ", options.len())?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Ok(Choice::Skip);
            }

            let answer = line.trim();
            if answer.is_empty() || answer.eq_ignore_ascii_case("s") {
                return Ok(Choice::Skip);
            }
            match answer.parse::<usize>() {
                Ok(n) if (1..=options.len()).contains(&n) => return Ok(Choice::Pick(n - 1)),
                _ => writeln!(self.output, "invalid choice '{}'", answer)?,
            }
        }

        Ok(Choice::Skip)
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead, W: Write> DecisionProvider for ConsoleDecider<R, W> {
    fn ask(&mut self, question: &Question, options: &[String]) -> Choice {
        if options.is_empty() {
            return Choice::Skip;
        }
        self.prompt(question, options).unwrap_or(Choice::Skip)
    }
}
