// Fixed capability catalog
// Names and parameter schemas; handlers are bound in the dispatcher

use crate::api::ToolDefinition;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Number,
    StringList,
}

impl ParamKind {
    fn json_schema(&self, description: &str) -> Value {
        match self {
            ParamKind::String => json!({ "type": "string", "description": description }),
            ParamKind::Number => json!({ "type": "number", "description": description }),
            ParamKind::StringList => json!({
                "type": "array",
                "items": { "type": "string" },
                "description": description,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

/// One named operation the dispatcher can run
#[derive(Debug, Clone, Copy)]
pub struct CapabilitySpec {
    pub name: &'static str,
    pub description: &'static str,
    /// Ordered; positional arguments bind in this order
    pub params: &'static [ParamSpec],
}

impl CapabilitySpec {
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// `name(param, [optional])` signature for prompts and help text
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| {
                if p.required {
                    p.name.to_string()
                } else {
                    format!("[{}]", p.name)
                }
            })
            .collect();
        format!("{}({})", self.name, params.join(", "))
    }

    /// Chat-completion tool advertising this capability
    pub fn tool_definition(&self) -> ToolDefinition {
        let mut properties = Map::new();
        for param in self.params {
            properties.insert(param.name.to_string(), param.kind.json_schema(param.description));
        }

        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();

        ToolDefinition::function(
            self.name,
            self.description,
            json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        )
    }
}

const SYMBOL: ParamSpec = ParamSpec {
    name: "symbol",
    kind: ParamKind::String,
    required: true,
    description: "Trading pair, e.g. BTCUSDT",
};

pub const CATALOG: &[CapabilitySpec] = &[
    CapabilitySpec {
        name: "technical_analysis",
        description: "Technical analysis of a symbol's candles and indicators",
        params: &[SYMBOL],
    },
    CapabilitySpec {
        name: "fundamental_analysis",
        description: "Fundamental analysis of a symbol",
        params: &[SYMBOL],
    },
    CapabilitySpec {
        name: "market_sentiment_analysis",
        description: "Market sentiment from fear/greed and trending coins",
        params: &[],
    },
    CapabilitySpec {
        name: "macro_analysis",
        description: "Macro view from global market aggregates",
        params: &[],
    },
    CapabilitySpec {
        name: "get_account_status",
        description: "Trading account balances and status",
        params: &[],
    },
    CapabilitySpec {
        name: "get_current_positions",
        description: "Open positions of the trading account",
        params: &[],
    },
    CapabilitySpec {
        name: "manual_trigger_analysis",
        description: "Analyse a monitored symbol on the next heartbeat pass",
        params: &[SYMBOL],
    },
    CapabilitySpec {
        name: "set_monitoring_symbols",
        description: "Replace the monitored symbol lists",
        params: &[
            ParamSpec {
                name: "primary_symbols",
                kind: ParamKind::StringList,
                required: true,
                description: "Primary symbols, e.g. [\"BTCUSDT\", \"ETHUSDT\"]",
            },
            ParamSpec {
                name: "secondary_symbols",
                kind: ParamKind::StringList,
                required: false,
                description: "Secondary symbols; omitted clears the list",
            },
        ],
    },
    CapabilitySpec {
        name: "get_monitoring_symbols",
        description: "Currently monitored symbol lists",
        params: &[],
    },
    CapabilitySpec {
        name: "set_heartbeat_interval",
        description: "Set the heartbeat interval, 60 to 3600 seconds",
        params: &[ParamSpec {
            name: "interval_seconds",
            kind: ParamKind::Number,
            required: true,
            description: "Heartbeat interval in seconds",
        }],
    },
    CapabilitySpec {
        name: "get_heartbeat_settings",
        description: "Current heartbeat and fetch intervals",
        params: &[],
    },
    CapabilitySpec {
        name: "send_notification",
        description: "Send a notification message to the operator",
        params: &[ParamSpec {
            name: "message",
            kind: ParamKind::String,
            required: true,
            description: "Notification text",
        }],
    },
    CapabilitySpec {
        name: "get_market_data",
        description: "Latest prices; defaults to every monitored symbol",
        params: &[ParamSpec {
            name: "symbols",
            kind: ParamKind::StringList,
            required: false,
            description: "Symbols to look up",
        }],
    },
    CapabilitySpec {
        name: "get_system_status",
        description: "Monitor status, settings and feed state",
        params: &[],
    },
    CapabilitySpec {
        name: "comprehensive_analysis",
        description: "Combined macro, sentiment, technical and fundamental analysis answering a question",
        params: &[
            ParamSpec {
                name: "question",
                kind: ParamKind::String,
                required: true,
                description: "Question or topic to analyse",
            },
            ParamSpec {
                name: "symbols",
                kind: ParamKind::StringList,
                required: false,
                description: "Symbols to cover; defaults to the primary symbols",
            },
        ],
    },
];

pub fn find(name: &str) -> Option<&'static CapabilitySpec> {
    CATALOG.iter().find(|c| c.name == name)
}

pub fn tool_definitions() -> Vec<ToolDefinition> {
    CATALOG.iter().map(|c| c.tool_definition()).collect()
}

/// One line per capability, for prompts
pub fn describe() -> String {
    CATALOG
        .iter()
        .map(|c| format!("- {}: {}", c.signature(), c.description))
        .collect::<Vec<_>>()
        .join("\n")
}
