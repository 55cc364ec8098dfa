use crate::strategy::Params;
use rust_decimal::Decimal;
use serde::Serialize;
use smol_str::SmolStr;
use std::str::FromStr;
use thiserror::Error;
use veloce_data::{event::EventTypeTag, time::TimestampNs};
use veloce_execution::{
    order::{OrderKind, OrderRequest, TimeInForce},
    venue::StreamSpec,
    ClientOrderId,
};
use veloce_instrument::{Side, Symbol, Venue};

/// All possible command parse errors. Surfaced as `error` events carrying the
/// offending line number; the session always continues.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Error)]
pub enum ParseError {
    #[error("empty command line")]
    Empty,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("expected {expected} arguments, got {actual}")]
    WrongArgCount { expected: &'static str, actual: usize },

    #[error("bad {field}: '{value}'")]
    BadField { field: &'static str, value: String },
}

impl ParseError {
    /// Snake_case tag used on the NDJSON event stream.
    pub fn tag(&self) -> &'static str {
        match self {
            ParseError::Empty | ParseError::UnknownCommand(_) => "invalid_command",
            ParseError::WrongArgCount { .. } | ParseError::BadField { .. } => "bad_params",
        }
    }
}

/// Strategy management sub-commands.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyCommand {
    /// `STRATEGY LOAD <id> <type> [<symbol>] [name=value ...]`
    Load {
        id: SmolStr,
        type_name: SmolStr,
        symbol: Option<Symbol>,
        params: Params,
    },
    Start { id: SmolStr },
    Stop { id: SmolStr },
    Pause { id: SmolStr },
    Resume { id: SmolStr },
    Unload { id: SmolStr },
    List,
    Status { id: Option<SmolStr> },
    /// `STRATEGY PARAMS <id> name=value [...]`
    Params { id: SmolStr, params: Params },
    Metrics { id: Option<SmolStr> },
}

/// Query sub-commands.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum QueryCommand {
    Order { cid: ClientOrderId },
    Orders,
    Account,
    Positions,
}

/// A fully parsed input command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Order(OrderRequest),
    Cancel(ClientOrderId),
    Query(QueryCommand),
    Strategy(StrategyCommand),
    Subscribe(StreamSpec),
    Unsubscribe(StreamSpec),
}

/// Parses one command per line into typed [`Command`]s.
///
/// Keywords are case-insensitive and single-letter aliases are accepted for
/// side (`B`/`S`), order type (`L`/`M`) and time-in-force (`G`/`I`/`F`).
/// `GTX` maps to post-only, distinct from `GTC`.
#[derive(Debug, Clone)]
pub struct CommandReader {
    /// Default venue applied to ORDER commands (orders are venue-implicit in
    /// the line protocol).
    pub default_venue: Venue,
}

impl Default for CommandReader {
    fn default() -> Self {
        Self {
            default_venue: Venue::Sim,
        }
    }
}

impl CommandReader {
    pub fn new(default_venue: Venue) -> Self {
        Self { default_venue }
    }

    /// Parse a single line. `now` stamps `ts_created` on order requests.
    pub fn parse(&self, line: &str, now: TimestampNs) -> Result<Command, ParseError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((keyword, rest)) = tokens.split_first() else {
            return Err(ParseError::Empty);
        };

        match keyword.to_ascii_uppercase().as_str() {
            "ORDER" => {
                let Some((side, rest)) = rest.split_first() else {
                    return Err(ParseError::WrongArgCount {
                        expected: "5..7",
                        actual: rest.len(),
                    });
                };
                self.parse_order(parse_side(side)?, rest, now)
            }
            "BUY" => self.parse_order(Side::Buy, rest, now),
            "SELL" => self.parse_order(Side::Sell, rest, now),
            "CANCEL" => match rest {
                [cid] => Ok(Command::Cancel(ClientOrderId::new(*cid))),
                _ => Err(ParseError::WrongArgCount {
                    expected: "1",
                    actual: rest.len(),
                }),
            },
            "QUERY" => parse_query(rest),
            "STRATEGY" => parse_strategy(rest),
            "SUBSCRIBE" => parse_stream_spec(rest).map(Command::Subscribe),
            "UNSUBSCRIBE" => parse_stream_spec(rest).map(Command::Unsubscribe),
            other => Err(ParseError::UnknownCommand(other.to_string())),
        }
    }

    /// `<symbol> <qty> <price> <cid> [<LIMIT|MARKET>] [<tif>]`
    fn parse_order(
        &self,
        side: Side,
        args: &[&str],
        now: TimestampNs,
    ) -> Result<Command, ParseError> {
        if args.len() < 4 || args.len() > 6 {
            return Err(ParseError::WrongArgCount {
                expected: "4..6",
                actual: args.len(),
            });
        }

        let symbol = Symbol::new(args[0]);
        let qty = parse_decimal("qty", args[1])?;
        let price = parse_decimal("price", args[2])?;
        let cid = ClientOrderId::new(args[3]);
        let kind = match args.get(4) {
            Some(token) => parse_kind(token)?,
            None => OrderKind::Limit,
        };
        let tif = match args.get(5) {
            Some(token) => parse_tif(token)?,
            None => TimeInForce::GoodUntilCancelled,
        };

        Ok(Command::Order(OrderRequest {
            cid,
            symbol,
            venue: self.default_venue,
            side,
            kind,
            tif,
            qty,
            price: match kind {
                OrderKind::Limit => Some(price),
                OrderKind::Market => None,
            },
            ts_created: now,
        }))
    }
}

fn parse_side(token: &str) -> Result<Side, ParseError> {
    match token.to_ascii_uppercase().as_str() {
        "BUY" | "B" => Ok(Side::Buy),
        "SELL" | "S" => Ok(Side::Sell),
        other => Err(ParseError::BadField {
            field: "side",
            value: other.to_string(),
        }),
    }
}

fn parse_kind(token: &str) -> Result<OrderKind, ParseError> {
    match token.to_ascii_uppercase().as_str() {
        "LIMIT" | "L" => Ok(OrderKind::Limit),
        "MARKET" | "M" => Ok(OrderKind::Market),
        other => Err(ParseError::BadField {
            field: "order type",
            value: other.to_string(),
        }),
    }
}

fn parse_tif(token: &str) -> Result<TimeInForce, ParseError> {
    match token.to_ascii_uppercase().as_str() {
        "GTC" | "G" => Ok(TimeInForce::GoodUntilCancelled),
        "IOC" | "I" => Ok(TimeInForce::ImmediateOrCancel),
        "FOK" | "F" => Ok(TimeInForce::FillOrKill),
        // GTX is the venue alias for post-only resting orders
        "GTX" => Ok(TimeInForce::PostOnly),
        other => Err(ParseError::BadField {
            field: "time in force",
            value: other.to_string(),
        }),
    }
}

fn parse_decimal(field: &'static str, token: &str) -> Result<Decimal, ParseError> {
    Decimal::from_str(token).map_err(|_| ParseError::BadField {
        field,
        value: token.to_string(),
    })
}

fn parse_query(args: &[&str]) -> Result<Command, ParseError> {
    let Some((kind, rest)) = args.split_first() else {
        return Err(ParseError::WrongArgCount {
            expected: "1..2",
            actual: args.len(),
        });
    };

    let query = match kind.to_ascii_uppercase().as_str() {
        "ORDER" => match rest {
            [cid] => QueryCommand::Order {
                cid: ClientOrderId::new(*cid),
            },
            _ => {
                return Err(ParseError::WrongArgCount {
                    expected: "2",
                    actual: args.len(),
                });
            }
        },
        "ORDERS" => QueryCommand::Orders,
        "ACCOUNT" | "BALANCE" => QueryCommand::Account,
        "POSITIONS" => QueryCommand::Positions,
        other => {
            return Err(ParseError::BadField {
                field: "query type",
                value: other.to_string(),
            });
        }
    };
    Ok(Command::Query(query))
}

fn parse_strategy(args: &[&str]) -> Result<Command, ParseError> {
    let Some((action, rest)) = args.split_first() else {
        return Err(ParseError::WrongArgCount {
            expected: "1+",
            actual: args.len(),
        });
    };

    let command = match action.to_ascii_uppercase().as_str() {
        "LOAD" => {
            if rest.len() < 2 {
                return Err(ParseError::WrongArgCount {
                    expected: "2+",
                    actual: rest.len(),
                });
            }
            let id = SmolStr::new(rest[0]);
            let type_name = SmolStr::new(rest[1]);
            let mut symbol = None;
            let mut param_args = &rest[2..];
            if let Some(first) = param_args.first() {
                if !first.contains('=') {
                    symbol = Some(Symbol::new(first));
                    param_args = &param_args[1..];
                }
            }
            StrategyCommand::Load {
                id,
                type_name,
                symbol,
                params: parse_params(param_args)?,
            }
        }
        "START" => StrategyCommand::Start {
            id: single_id(rest)?,
        },
        "STOP" => StrategyCommand::Stop {
            id: single_id(rest)?,
        },
        "PAUSE" => StrategyCommand::Pause {
            id: single_id(rest)?,
        },
        "RESUME" => StrategyCommand::Resume {
            id: single_id(rest)?,
        },
        "UNLOAD" => StrategyCommand::Unload {
            id: single_id(rest)?,
        },
        "LIST" => StrategyCommand::List,
        "STATUS" => StrategyCommand::Status {
            id: rest.first().map(|id| SmolStr::new(*id)),
        },
        "PARAMS" => {
            let Some((id, param_args)) = rest.split_first() else {
                return Err(ParseError::WrongArgCount {
                    expected: "2+",
                    actual: rest.len(),
                });
            };
            StrategyCommand::Params {
                id: SmolStr::new(*id),
                params: parse_params(param_args)?,
            }
        }
        "METRICS" => StrategyCommand::Metrics {
            id: rest.first().map(|id| SmolStr::new(*id)),
        },
        other => {
            return Err(ParseError::BadField {
                field: "strategy action",
                value: other.to_string(),
            });
        }
    };
    Ok(Command::Strategy(command))
}

fn single_id(args: &[&str]) -> Result<SmolStr, ParseError> {
    match args {
        [id] => Ok(SmolStr::new(*id)),
        _ => Err(ParseError::WrongArgCount {
            expected: "1",
            actual: args.len(),
        }),
    }
}

fn parse_params(args: &[&str]) -> Result<Params, ParseError> {
    let mut params = Params::new();
    for arg in args {
        let Some((name, value)) = arg.split_once('=') else {
            return Err(ParseError::BadField {
                field: "param",
                value: arg.to_string(),
            });
        };
        let value: f64 = value.parse().map_err(|_| ParseError::BadField {
            field: "param value",
            value: arg.to_string(),
        })?;
        params.insert(name.to_string(), value);
    }
    Ok(params)
}

fn parse_stream_spec(args: &[&str]) -> Result<StreamSpec, ParseError> {
    match args {
        [venue, symbol, event_type] => {
            let venue = Venue::parse(venue).ok_or_else(|| ParseError::BadField {
                field: "venue",
                value: venue.to_string(),
            })?;
            let event_type =
                EventTypeTag::parse(event_type).ok_or_else(|| ParseError::BadField {
                    field: "event type",
                    value: event_type.to_string(),
                })?;
            Ok(StreamSpec::new(venue, Symbol::new(symbol), event_type))
        }
        _ => Err(ParseError::WrongArgCount {
            expected: "3",
            actual: args.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn reader() -> CommandReader {
        CommandReader::default()
    }

    fn now() -> TimestampNs {
        TimestampNs::from_millis(5)
    }

    #[test]
    fn test_parse_order_variants() {
        struct TestCase {
            name: &'static str,
            line: &'static str,
            expected_side: Side,
            expected_kind: OrderKind,
            expected_tif: TimeInForce,
        }

        let cases = vec![
            TestCase {
                name: "explicit ORDER with defaults",
                line: "ORDER BUY BTCUSDT 0.001 50000.0 t1",
                expected_side: Side::Buy,
                expected_kind: OrderKind::Limit,
                expected_tif: TimeInForce::GoodUntilCancelled,
            },
            TestCase {
                name: "BUY shorthand",
                line: "BUY BTCUSDT 0.001 50000.0 t1",
                expected_side: Side::Buy,
                expected_kind: OrderKind::Limit,
                expected_tif: TimeInForce::GoodUntilCancelled,
            },
            TestCase {
                name: "SELL with type and tif",
                line: "SELL ETHUSDT 1.0 3200 t2 LIMIT IOC",
                expected_side: Side::Sell,
                expected_kind: OrderKind::Limit,
                expected_tif: TimeInForce::ImmediateOrCancel,
            },
            TestCase {
                name: "case-insensitive with single-letter aliases",
                line: "order s ethusdt 1.0 3200 t3 l f",
                expected_side: Side::Sell,
                expected_kind: OrderKind::Limit,
                expected_tif: TimeInForce::FillOrKill,
            },
            TestCase {
                name: "GTX maps to post-only",
                line: "ORDER BUY BTCUSDT 1 100 t4 LIMIT GTX",
                expected_side: Side::Buy,
                expected_kind: OrderKind::Limit,
                expected_tif: TimeInForce::PostOnly,
            },
            TestCase {
                name: "market order drops price",
                line: "ORDER B BTCUSDT 1 0 t5 MARKET IOC",
                expected_side: Side::Buy,
                expected_kind: OrderKind::Market,
                expected_tif: TimeInForce::ImmediateOrCancel,
            },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            let Command::Order(request) = reader().parse(test.line, now()).unwrap() else {
                panic!("TC{index} ({}) did not parse as Order", test.name);
            };
            assert_eq!(request.side, test.expected_side, "TC{index} failed");
            assert_eq!(request.kind, test.expected_kind, "TC{index} failed");
            assert_eq!(request.tif, test.expected_tif, "TC{index} failed");
            assert_eq!(request.ts_created, now(), "TC{index} failed");
            if test.expected_kind == OrderKind::Market {
                assert_eq!(request.price, None, "TC{index} failed");
            } else {
                assert!(request.price.is_some(), "TC{index} failed");
            }
        }
    }

    #[test]
    fn test_parse_order_fields() {
        let Command::Order(request) = reader()
            .parse("ORDER BUY btcusdt 0.001 50000.5 my-id-1", now())
            .unwrap()
        else {
            panic!("expected order");
        };
        assert_eq!(request.symbol, Symbol::new("BTCUSDT"));
        assert_eq!(request.qty, dec!(0.001));
        assert_eq!(request.price, Some(dec!(50000.5)));
        assert_eq!(request.cid, ClientOrderId::new("my-id-1"));
        assert_eq!(request.venue, Venue::Sim);
    }

    #[test]
    fn test_parse_errors() {
        struct TestCase {
            line: &'static str,
            expected_tag: &'static str,
        }

        let cases = vec![
            TestCase {
                line: "",
                expected_tag: "invalid_command",
            },
            TestCase {
                line: "FROBNICATE x",
                expected_tag: "invalid_command",
            },
            TestCase {
                line: "ORDER BUY BTCUSDT 0.001",
                expected_tag: "bad_params",
            },
            TestCase {
                line: "ORDER BUY BTCUSDT abc 50000 t1",
                expected_tag: "bad_params",
            },
            TestCase {
                line: "ORDER HOLD BTCUSDT 1 50000 t1",
                expected_tag: "bad_params",
            },
            TestCase {
                line: "CANCEL",
                expected_tag: "bad_params",
            },
            TestCase {
                line: "SUBSCRIBE nasdaq BTCUSDT trade",
                expected_tag: "bad_params",
            },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            let error = reader().parse(test.line, now()).unwrap_err();
            assert_eq!(error.tag(), test.expected_tag, "TC{index} failed: {error}");
        }
    }

    #[test]
    fn test_parse_cancel_query_subscribe() {
        assert_eq!(
            reader().parse("CANCEL t2", now()).unwrap(),
            Command::Cancel(ClientOrderId::new("t2"))
        );
        assert_eq!(
            reader().parse("QUERY order t2", now()).unwrap(),
            Command::Query(QueryCommand::Order {
                cid: ClientOrderId::new("t2")
            })
        );
        assert_eq!(
            reader().parse("QUERY ACCOUNT", now()).unwrap(),
            Command::Query(QueryCommand::Account)
        );
        assert_eq!(
            reader().parse("SUBSCRIBE binance BTCUSDT trade", now()).unwrap(),
            Command::Subscribe(StreamSpec::new(
                Venue::Binance,
                Symbol::new("BTCUSDT"),
                EventTypeTag::Trade
            ))
        );
    }

    #[test]
    fn test_parse_strategy_commands() {
        let Command::Strategy(StrategyCommand::Load {
            id,
            type_name,
            symbol,
            params,
        }) = reader()
            .parse("STRATEGY LOAD m1 momentum ETHUSDT fast=5 slow=15", now())
            .unwrap()
        else {
            panic!("expected strategy load");
        };
        assert_eq!(id, "m1");
        assert_eq!(type_name, "momentum");
        assert_eq!(symbol, Some(Symbol::new("ETHUSDT")));
        assert_eq!(params.get("fast"), Some(&5.0));
        assert_eq!(params.get("slow"), Some(&15.0));

        assert_eq!(
            reader().parse("STRATEGY START m1", now()).unwrap(),
            Command::Strategy(StrategyCommand::Start {
                id: SmolStr::new("m1")
            })
        );
        assert_eq!(
            reader().parse("STRATEGY LIST", now()).unwrap(),
            Command::Strategy(StrategyCommand::List)
        );
        assert_eq!(
            reader().parse("STRATEGY STATUS", now()).unwrap(),
            Command::Strategy(StrategyCommand::Status { id: None })
        );
    }
}
