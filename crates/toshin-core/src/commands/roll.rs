//! `roll <expression>`: sums of dice terms (`NdM`) and constants

use rand::Rng;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use toshin_ipc::Embed;

use crate::dispatch::{CommandHandler, Verdict};
use crate::error::CommandError;
use crate::registry::CommandDescriptor;
use crate::reply::ReplyOptions;
use crate::request::CommandRequest;

use super::{framed, render_roll, usage_error, SharedRng};

const COMMAND: &str = "roll";
pub const MAX_DICE: u32 = 100;
pub const MAX_SIDES: u32 = 1000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExpressionError {
    #[error("expression is empty")]
    Empty,

    #[error("unexpected term \"{0}\"")]
    InvalidTerm(String),

    #[error("cannot roll more than 100 dice at once")]
    TooManyDice,

    #[error("a die needs between 1 and 1000 sides")]
    InvalidSides,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Term {
    Dice { count: u32, sides: u32 },
    Constant(u32),
}

/// One signed term of a dice expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignedTerm {
    pub negative: bool,
    pub term: Term,
}

fn dice_regex() -> &'static Regex {
    static DICE: OnceLock<Regex> = OnceLock::new();
    DICE.get_or_init(|| Regex::new(r"^(\d*)d(\d+)$").expect("dice pattern is valid"))
}

fn parse_term(raw: &str) -> Result<Term, ExpressionError> {
    if let Ok(value) = raw.parse::<u32>() {
        return Ok(Term::Constant(value));
    }

    let caps = dice_regex()
        .captures(raw)
        .ok_or_else(|| ExpressionError::InvalidTerm(raw.to_string()))?;
    let count = match &caps[1] {
        "" => 1,
        digits => digits.parse::<u32>().map_err(|_| ExpressionError::TooManyDice)?,
    };
    if count == 0 {
        return Err(ExpressionError::InvalidTerm(raw.to_string()));
    }
    if count > MAX_DICE {
        return Err(ExpressionError::TooManyDice);
    }
    let sides = caps[2]
        .parse::<u32>()
        .map_err(|_| ExpressionError::InvalidSides)?;
    if !(1..=MAX_SIDES).contains(&sides) {
        return Err(ExpressionError::InvalidSides);
    }
    Ok(Term::Dice { count, sides })
}

/// Parse `2d6+3`, `d20 - 1`, `1d4+1d8`. Whitespace is ignored.
pub fn parse_expression(expression: &str) -> Result<Vec<SignedTerm>, ExpressionError> {
    let compact: String = expression
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    if compact.is_empty() {
        return Err(ExpressionError::Empty);
    }

    let mut terms = Vec::new();
    let mut negative = false;
    let mut current = String::new();
    for ch in compact.chars() {
        if ch == '+' || ch == '-' {
            // A sign may lead the expression, but not follow an empty term.
            if !current.is_empty() {
                terms.push(SignedTerm {
                    negative,
                    term: parse_term(&current)?,
                });
                current.clear();
            } else if !terms.is_empty() || negative {
                return Err(ExpressionError::InvalidTerm(ch.to_string()));
            }
            negative = ch == '-';
        } else {
            current.push(ch);
        }
    }
    if current.is_empty() {
        return Err(ExpressionError::InvalidTerm(String::new()));
    }
    terms.push(SignedTerm {
        negative,
        term: parse_term(&current)?,
    });
    Ok(terms)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollResult {
    pub total: i64,
    /// Each die shown as rolled, e.g. `[3, 5] + 2`.
    pub rendered: String,
}

pub fn roll_expression<R: Rng>(terms: &[SignedTerm], rng: &mut R) -> RollResult {
    let mut total = 0i64;
    let mut rendered = String::new();

    for (i, signed) in terms.iter().enumerate() {
        let (value, shown) = match signed.term {
            Term::Constant(value) => (i64::from(value), value.to_string()),
            Term::Dice { count, sides } => {
                let rolls: Vec<u32> = (0..count).map(|_| rng.gen_range(1..=sides)).collect();
                let sum: i64 = rolls.iter().map(|roll| i64::from(*roll)).sum();
                let listed = rolls
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                (sum, format!("[{}]", listed))
            }
        };

        match (i, signed.negative) {
            (0, false) => {}
            (0, true) => rendered.push('-'),
            (_, false) => rendered.push_str(" + "),
            (_, true) => rendered.push_str(" - "),
        }
        rendered.push_str(&shown);

        if signed.negative {
            total -= value;
        } else {
            total += value;
        }
    }

    RollResult { total, rendered }
}

pub struct RollCommand {
    emoji: String,
    rng: Arc<SharedRng>,
}

impl RollCommand {
    pub fn new(emoji: &str, rng: Arc<SharedRng>) -> Self {
        Self {
            emoji: emoji.to_string(),
            rng,
        }
    }

    fn descriptor() -> CommandDescriptor {
        CommandDescriptor::new(COMMAND, "rolls dice with expression").with_parameter(
            "expression",
            "dice expression",
            true,
        )
    }
}

#[async_trait::async_trait]
impl CommandHandler for RollCommand {
    fn name(&self) -> &str {
        COMMAND
    }

    fn describe(&self) -> Vec<CommandDescriptor> {
        vec![Self::descriptor()]
    }

    async fn handle(&self, request: &CommandRequest) -> Result<Verdict, CommandError> {
        if request.command() != COMMAND {
            return Ok(Verdict::Declined);
        }

        let expression = request.param_string();
        let terms = match parse_expression(&expression) {
            Ok(terms) => terms,
            Err(ExpressionError::Empty) => {
                request.reply(usage_error(&Self::descriptor())).await?;
                return Ok(Verdict::Handled);
            }
            Err(e) => {
                request
                    .reply(framed(&self.emoji, &format!("Error: {}", e)))
                    .await?;
                return Ok(Verdict::Handled);
            }
        };

        let result = self.rng.with(|rng| roll_expression(&terms, rng));
        let description = format!(
            "{}\n\n{}",
            render_roll(&self.emoji, result.total),
            result.rendered
        );
        request
            .reply(ReplyOptions::embed(Embed::description(description)))
            .await?;
        Ok(Verdict::Handled)
    }
}
