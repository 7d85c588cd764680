use nom::{
    bytes::complete::tag_no_case,
    character::complete::hex_digit1,
    combinator::{all_consuming, opt},
    sequence::preceded,
    IResult,
};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TraceError {
    #[error("token #{index} `{token}` is not a hexadecimal address")]
    InvalidToken { index: usize, token: String },
    #[error("token #{index} `{token}` does not fit in 32 bits")]
    Overflow { index: usize, token: String },
    #[error("expected {expected} addresses but the trace holds only {found}")]
    TooShort { expected: usize, found: usize },
}

/// Addresses to replay, in order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Trace {
    addresses: Vec<u32>,
}

impl Trace {
    /// Reads whitespace separated hex tokens (`0x` prefix optional).
    /// With `count`, exactly that many are taken and the rest is ignored.
    pub fn parse(src: &str, count: Option<usize>) -> Result<Self, TraceError> {
        let mut tokens = src.split_whitespace();
        let addresses = tokens
            .by_ref()
            .take(count.unwrap_or(usize::MAX))
            .enumerate()
            .map(|(index, token)| parse_token(index, token))
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(expected) = count {
            if addresses.len() < expected {
                return Err(TraceError::TooShort {
                    expected,
                    found: addresses.len(),
                });
            }
            let rest = tokens.count();
            if rest != 0 {
                log::warn!("ignoring {rest} tokens after {expected} addresses");
            }
        }
        Ok(Self { addresses })
    }
    pub fn len(&self) -> usize {
        self.addresses.len()
    }
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.addresses.iter().copied()
    }
}

impl FromIterator<u32> for Trace {
    fn from_iter<T: IntoIterator<Item = u32>>(iter: T) -> Self {
        Self {
            addresses: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Trace {
    type Item = u32;

    type IntoIter = <Vec<u32> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.addresses.into_iter()
    }
}

fn hex_digits(input: &str) -> IResult<&str, &str> {
    preceded(opt(tag_no_case("0x")), hex_digit1)(input)
}

fn parse_token(index: usize, token: &str) -> Result<u32, TraceError> {
    let (_, digits) = all_consuming(hex_digits)(token).map_err(|_| TraceError::InvalidToken {
        index,
        token: token.to_owned(),
    })?;
    u32::from_str_radix(digits, 16).map_err(|_| TraceError::Overflow {
        index,
        token: token.to_owned(),
    })
}
