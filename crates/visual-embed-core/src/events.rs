//! Event tags exchanged between the host page and the embedded app.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident => $wire:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownEventTag;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                match raw {
                    $($wire => Ok($name::$variant),)+
                    other => Err(UnknownEventTag(other.to_string())),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event tag: {0}")]
pub struct UnknownEventTag(pub String);

wire_enum! {
    /// Actions the host page asks the embedded app to perform.
    pub enum HostEvent {
        Search => "search",
        DrillDown => "triggerDrillDown",
        SetVisibleVizs => "SetPinboardVisibleVizs",
        SetVisibleTabs => "SetVisibleTabs",
        SetHiddenTabs => "SetHiddenTabs",
        SetActiveTab => "SetActiveTab",
        UpdateRuntimeFilters => "UpdateRuntimeFilters",
        UpdateFilters => "updateFilters",
        OpenFilter => "openFilter",
        AddColumns => "addColumns",
        RemoveColumn => "removeColumn",
        Navigate => "Navigate",
        Reload => "reload",
        Pin => "pin",
        Save => "save",
        SaveAnswer => "saveAnswer",
        Download => "download",
        DownloadAsPdf => "downloadAsPdf",
        DownloadAsCsv => "downloadAsCSV",
        DownloadAsXlsx => "downloadAsXLSX",
        Explore => "explore",
        Edit => "edit",
        MakeACopy => "makeACopy",
        Remove => "delete",
        Share => "share",
        Schedule => "subscription",
        SchedulesList => "schedule-list",
        ExportTml => "exportTSL",
        EditTml => "editTSL",
        UpdateTml => "updateTSL",
        GetTml => "getTML",
        GetIframeUrl => "GetIframeUrl",
        GetAnswerSession => "getAnswerSession",
        GetFilters => "getFilters",
        GetTabs => "getTabs",
        GetParameters => "GetParameters",
        UpdateParameters => "UpdateParameters",
        ShowUnderlyingData => "showUnderlyingData",
        ResetSearch => "resetSearch",
        Present => "present",
        ExitPresentMode => "exitPresentMode",
        UiPassthrough => "UiPassthrough",
    }
}

wire_enum! {
    /// Notifications the embedded app raises towards the host page.
    pub enum EmbedEvent {
        Init => "init",
        AuthInit => "authInit",
        AuthExpire => "ThoughtspotAuthExpired",
        IdleSessionTimeout => "IdleSessionTimeout",
        NoCookieAccess => "noCookieAccess",
        Load => "load",
        Data => "data",
        RouteChange => "ROUTE_CHANGE",
        EmbedListenerReady => "EmbedListenerReady",
        CustomAction => "customAction",
        Save => "save",
        Pin => "pin",
        Error => "Error",
        ApiIntercept => "ApiIntercept",
        OnBeforeGetVizDataIntercept => "onBeforeGetVizDataIntercept",
    }
}

/// Receives events the SDK raises on behalf of the embedded app.
pub trait EmbedEventSink {
    fn execute_event(&self, event: EmbedEvent, data: Value);
}

impl<F> EmbedEventSink for F
where
    F: Fn(EmbedEvent, Value),
{
    fn execute_event(&self, event: EmbedEvent, data: Value) {
        self(event, data);
    }
}

/// Replies to an inbound event on the port the embedded app supplied.
pub trait Responder {
    fn respond(&self, reply: Value);
}

impl<F> Responder for F
where
    F: Fn(Value),
{
    fn respond(&self, reply: Value) {
        self(reply);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn wire_names_are_unique() {
        let host: HashSet<_> = HostEvent::ALL.iter().map(|event| event.as_str()).collect();
        assert_eq!(host.len(), HostEvent::ALL.len());
        let embed: HashSet<_> = EmbedEvent::ALL.iter().map(|event| event.as_str()).collect();
        assert_eq!(embed.len(), EmbedEvent::ALL.len());
    }

    #[test]
    fn events_parse_from_wire_names() {
        assert_eq!("pin".parse::<HostEvent>(), Ok(HostEvent::Pin));
        assert_eq!(
            "ThoughtspotAuthExpired".parse::<EmbedEvent>(),
            Ok(EmbedEvent::AuthExpire)
        );
        assert_eq!(
            "bogus".parse::<HostEvent>(),
            Err(UnknownEventTag("bogus".to_string()))
        );
    }

    #[test]
    fn events_serialize_as_wire_strings() {
        let value = serde_json::to_value(HostEvent::SaveAnswer).expect("serialize");
        assert_eq!(value, Value::String("saveAnswer".to_string()));
        let parsed: EmbedEvent =
            serde_json::from_value(Value::String("ApiIntercept".to_string())).expect("parse");
        assert_eq!(parsed, EmbedEvent::ApiIntercept);
    }
}
