use super::catalog::{self, CapabilitySpec, ParamKind};
use super::error::DispatchError;
use std::collections::HashMap;
use std::fmt;

/// Untyped argument value as written in a directive or tool call
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Number(f64),
    List(Vec<String>),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Str(s) => write!(f, "{:?}", s),
            ParamValue::Number(n) => write!(f, "{}", n),
            ParamValue::List(items) => write!(f, "{:?}", items),
        }
    }
}

/// A capability name plus its unvalidated arguments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawInvocation {
    pub name: String,
    pub named: HashMap<String, ParamValue>,
    pub positional: Vec<ParamValue>,
}

impl RawInvocation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, name: &str, value: ParamValue) -> Self {
        self.named.insert(name.to_string(), value);
        self
    }
}

/// A validated capability invocation
#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityCall {
    TechnicalAnalysis { symbol: String },
    FundamentalAnalysis { symbol: String },
    MarketSentimentAnalysis,
    MacroAnalysis,
    GetAccountStatus,
    GetCurrentPositions,
    ManualTriggerAnalysis { symbol: String },
    SetMonitoringSymbols {
        primary: Vec<String>,
        /// Omitted in the invocation means empty
        secondary: Vec<String>,
    },
    GetMonitoringSymbols,
    SetHeartbeatInterval { interval_seconds: f64 },
    GetHeartbeatSettings,
    SendNotification { message: String },
    GetMarketData { symbols: Option<Vec<String>> },
    GetSystemStatus,
    ComprehensiveAnalysis {
        question: String,
        /// `None` analyses the primary symbols
        symbols: Option<Vec<String>>,
    },
}

impl CapabilityCall {
    pub fn name(&self) -> &'static str {
        match self {
            CapabilityCall::TechnicalAnalysis { .. } => "technical_analysis",
            CapabilityCall::FundamentalAnalysis { .. } => "fundamental_analysis",
            CapabilityCall::MarketSentimentAnalysis => "market_sentiment_analysis",
            CapabilityCall::MacroAnalysis => "macro_analysis",
            CapabilityCall::GetAccountStatus => "get_account_status",
            CapabilityCall::GetCurrentPositions => "get_current_positions",
            CapabilityCall::ManualTriggerAnalysis { .. } => "manual_trigger_analysis",
            CapabilityCall::SetMonitoringSymbols { .. } => "set_monitoring_symbols",
            CapabilityCall::GetMonitoringSymbols => "get_monitoring_symbols",
            CapabilityCall::SetHeartbeatInterval { .. } => "set_heartbeat_interval",
            CapabilityCall::GetHeartbeatSettings => "get_heartbeat_settings",
            CapabilityCall::SendNotification { .. } => "send_notification",
            CapabilityCall::GetMarketData { .. } => "get_market_data",
            CapabilityCall::GetSystemStatus => "get_system_status",
            CapabilityCall::ComprehensiveAnalysis { .. } => "comprehensive_analysis",
        }
    }

    /// The single symbol this call targets, if any
    pub fn symbol(&self) -> Option<&str> {
        match self {
            CapabilityCall::TechnicalAnalysis { symbol }
            | CapabilityCall::FundamentalAnalysis { symbol }
            | CapabilityCall::ManualTriggerAnalysis { symbol } => Some(symbol),
            _ => None,
        }
    }

    /// Validate `raw` against the catalog and build the typed call
    pub fn bind(raw: &RawInvocation) -> Result<Self, DispatchError> {
        let spec = catalog::find(&raw.name)
            .ok_or_else(|| DispatchError::UnknownCapability(raw.name.clone()))?;
        let mut args = Args::collect(spec, raw)?;

        let call = match spec.name {
            "technical_analysis" => CapabilityCall::TechnicalAnalysis {
                symbol: args.required_str("symbol")?,
            },
            "fundamental_analysis" => CapabilityCall::FundamentalAnalysis {
                symbol: args.required_str("symbol")?,
            },
            "market_sentiment_analysis" => CapabilityCall::MarketSentimentAnalysis,
            "macro_analysis" => CapabilityCall::MacroAnalysis,
            "get_account_status" => CapabilityCall::GetAccountStatus,
            "get_current_positions" => CapabilityCall::GetCurrentPositions,
            "manual_trigger_analysis" => CapabilityCall::ManualTriggerAnalysis {
                symbol: args.required_str("symbol")?,
            },
            "set_monitoring_symbols" => CapabilityCall::SetMonitoringSymbols {
                primary: args.required_list("primary_symbols")?,
                secondary: args.optional_list("secondary_symbols")?.unwrap_or_default(),
            },
            "get_monitoring_symbols" => CapabilityCall::GetMonitoringSymbols,
            "set_heartbeat_interval" => CapabilityCall::SetHeartbeatInterval {
                interval_seconds: args.required_number("interval_seconds")?,
            },
            "get_heartbeat_settings" => CapabilityCall::GetHeartbeatSettings,
            "send_notification" => CapabilityCall::SendNotification {
                message: args.required_str("message")?,
            },
            "get_market_data" => CapabilityCall::GetMarketData {
                symbols: args.optional_list("symbols")?,
            },
            "get_system_status" => CapabilityCall::GetSystemStatus,
            "comprehensive_analysis" => CapabilityCall::ComprehensiveAnalysis {
                question: args.required_str("question")?,
                symbols: args.optional_list("symbols")?,
            },
            other => return Err(DispatchError::UnknownCapability(other.to_string())),
        };

        Ok(call)
    }
}

/// Arguments of one invocation keyed by schema name
struct Args {
    spec: &'static CapabilitySpec,
    values: HashMap<&'static str, ParamValue>,
}

impl Args {
    fn collect(spec: &'static CapabilitySpec, raw: &RawInvocation) -> Result<Self, DispatchError> {
        if raw.positional.len() > spec.params.len() {
            return Err(DispatchError::MalformedDirective(format!(
                "{} takes {} argument(s), got {}",
                spec.name,
                spec.params.len(),
                raw.positional.len()
            )));
        }

        let mut values = HashMap::new();

        for (param, value) in spec.params.iter().zip(raw.positional.iter()) {
            values.insert(param.name, value.clone());
        }

        for (name, value) in &raw.named {
            match spec.param(name) {
                Some(param) => {
                    if values.insert(param.name, value.clone()).is_some() {
                        return Err(DispatchError::InvalidParameter {
                            capability: spec.name.to_string(),
                            parameter: name.clone(),
                            reason: "given both positionally and by name".to_string(),
                        });
                    }
                }
                None => {
                    tracing::warn!(capability = spec.name, parameter = %name, "Ignoring unknown parameter");
                }
            }
        }

        let mut args = Self { spec, values };
        for param in spec.params {
            args.coerce(param.name, param.kind)?;
        }
        Ok(args)
    }

    /// Bring a present value to its schema kind
    fn coerce(&mut self, name: &'static str, kind: ParamKind) -> Result<(), DispatchError> {
        let Some(value) = self.values.remove(name) else {
            return Ok(());
        };

        let coerced = match (kind, value) {
            (ParamKind::String, ParamValue::Str(s)) => ParamValue::Str(s),
            (ParamKind::String, ParamValue::Number(n)) => ParamValue::Str(n.to_string()),
            (ParamKind::Number, ParamValue::Number(n)) => ParamValue::Number(n),
            (ParamKind::Number, ParamValue::Str(s)) => match s.trim().parse::<f64>() {
                Ok(n) => ParamValue::Number(n),
                Err(_) => return Err(self.invalid(name, format!("expected a number, got {:?}", s))),
            },
            (ParamKind::StringList, ParamValue::List(items)) => ParamValue::List(items),
            (ParamKind::StringList, ParamValue::Str(s)) => ParamValue::List(vec![s]),
            (_, other) => {
                return Err(self.invalid(name, format!("unexpected value {}", other)));
            }
        };

        self.values.insert(name, coerced);
        Ok(())
    }

    fn invalid(&self, name: &str, reason: String) -> DispatchError {
        DispatchError::InvalidParameter {
            capability: self.spec.name.to_string(),
            parameter: name.to_string(),
            reason,
        }
    }

    fn missing(&self, name: &str) -> DispatchError {
        DispatchError::MissingParameter {
            capability: self.spec.name.to_string(),
            parameter: name.to_string(),
        }
    }

    fn required_str(&mut self, name: &str) -> Result<String, DispatchError> {
        match self.values.remove(name) {
            Some(ParamValue::Str(s)) if !s.trim().is_empty() => Ok(s),
            Some(ParamValue::Str(_)) => Err(self.invalid(name, "must not be empty".to_string())),
            Some(other) => Err(self.invalid(name, format!("unexpected value {}", other))),
            None => Err(self.missing(name)),
        }
    }

    fn required_number(&mut self, name: &str) -> Result<f64, DispatchError> {
        match self.values.remove(name) {
            Some(ParamValue::Number(n)) => Ok(n),
            Some(other) => Err(self.invalid(name, format!("unexpected value {}", other))),
            None => Err(self.missing(name)),
        }
    }

    fn optional_list(&mut self, name: &str) -> Result<Option<Vec<String>>, DispatchError> {
        match self.values.remove(name) {
            Some(ParamValue::List(items)) => Ok(Some(items)),
            Some(other) => Err(self.invalid(name, format!("unexpected value {}", other))),
            None => Ok(None),
        }
    }

    fn required_list(&mut self, name: &str) -> Result<Vec<String>, DispatchError> {
        self.optional_list(name)?.ok_or_else(|| self.missing(name))
    }
}
