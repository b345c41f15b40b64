//! Realtime channel names of the form `projectId:channelType[:identifier]`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tenantgate_core_types::{GateError, GateResult, ProjectId};
use tracing::warn;

use crate::reserved::is_reserved_name;

pub const MAX_IDENTIFIER_LEN: usize = 100;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Table,
    User,
    Presence,
    Broadcast,
}

impl ChannelType {
    pub const ALL: [ChannelType; 4] = [
        ChannelType::Table,
        ChannelType::User,
        ChannelType::Presence,
        ChannelType::Broadcast,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Table => "table",
            ChannelType::User => "user",
            ChannelType::Presence => "presence",
            ChannelType::Broadcast => "broadcast",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelType {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChannelType::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| GateError::InvalidChannelFormat("unknown channel type".into()))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParsedChannel {
    pub project_id: ProjectId,
    pub channel_type: ChannelType,
    pub identifier: Option<String>,
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':' | '@')
}

fn check_identifier(identifier: &str) -> GateResult<()> {
    if identifier.is_empty() {
        return Err(GateError::InvalidChannelFormat(
            "channel identifier is empty".into(),
        ));
    }
    if identifier.chars().count() > MAX_IDENTIFIER_LEN {
        return Err(GateError::InvalidChannelFormat(format!(
            "channel identifier exceeds {MAX_IDENTIFIER_LEN} characters"
        )));
    }
    if is_reserved_name(identifier) {
        return Err(GateError::InvalidChannelName);
    }
    if !identifier.chars().all(is_identifier_char) {
        return Err(GateError::InvalidChannelFormat(
            "channel identifier contains unsupported characters".into(),
        ));
    }
    Ok(())
}

/// Parses and validates a channel without any ownership check.
pub fn parse_channel(channel: &str) -> GateResult<ParsedChannel> {
    let mut parts = channel.splitn(3, ':');
    let (Some(raw_project), Some(raw_type)) = (parts.next(), parts.next()) else {
        return Err(GateError::InvalidChannelFormat(
            "expected projectId:channelType[:identifier]".into(),
        ));
    };
    let identifier = parts.next();

    let project_id = ProjectId::parse(raw_project).ok_or_else(|| {
        GateError::InvalidChannelFormat("channel project id is not a uuid".into())
    })?;

    if is_reserved_name(raw_type) {
        return Err(GateError::InvalidChannelName);
    }
    let channel_type = raw_type.parse::<ChannelType>()?;

    if let Some(identifier) = identifier {
        check_identifier(identifier)?;
    }

    Ok(ParsedChannel {
        project_id,
        channel_type,
        identifier: identifier.map(str::to_string),
    })
}

/// Confirms `channel` belongs to `caller`. A foreign project is a hard denial.
pub fn assert_subscription(channel: &str, caller: Option<&ProjectId>) -> GateResult<ParsedChannel> {
    let Some(caller) = caller else {
        return Err(GateError::MissingProjectId);
    };
    let parsed = parse_channel(channel)?;
    if parsed.project_id != *caller {
        warn!(
            target: "isolation-guards",
            caller = %caller,
            channel_project = %parsed.project_id,
            "cross-project channel subscription denied"
        );
        return Err(GateError::CrossProjectChannel);
    }
    Ok(parsed)
}

/// Builds a channel for `project`, validating the result with the same rules as
/// [`assert_subscription`].
pub fn build_channel(
    project: &ProjectId,
    channel_type: ChannelType,
    identifier: Option<&str>,
) -> GateResult<String> {
    let channel = match identifier {
        Some(identifier) => format!("{project}:{channel_type}:{identifier}"),
        None => format!("{project}:{channel_type}"),
    };
    assert_subscription(&channel, Some(project))?;
    Ok(channel)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PID: &str = "11111111-1111-1111-1111-111111111111";

    fn pid() -> ProjectId {
        ProjectId::parse(PID).unwrap()
    }

    #[test]
    fn identifier_is_optional() {
        let channel = build_channel(&pid(), ChannelType::Presence, None).unwrap();
        assert_eq!(channel, format!("{PID}:presence"));
        let parsed = parse_channel(&channel).unwrap();
        assert_eq!(parsed.identifier, None);
    }

    #[test]
    fn trailing_colon_is_malformed() {
        let err = parse_channel(&format!("{PID}:table:")).unwrap_err();
        assert_eq!(err.code(), "INVALID_CHANNEL_FORMAT");
    }

    #[test]
    fn identifiers_may_contain_colons() {
        let parsed = parse_channel(&format!("{PID}:table:public:users")).unwrap();
        assert_eq!(parsed.identifier.as_deref(), Some("public:users"));
    }

    #[test]
    fn reserved_names_fail_in_either_slot() {
        for channel in [
            format!("{PID}:admin"),
            format!("{PID}:SYSTEM:users"),
            format!("{PID}:table:internal"),
            format!("{PID}:broadcast:*"),
        ] {
            assert_eq!(parse_channel(&channel).unwrap_err(), GateError::InvalidChannelName);
        }
    }

    #[test]
    fn malformed_channels_are_format_errors() {
        let long = "x".repeat(MAX_IDENTIFIER_LEN + 1);
        for channel in [
            "no-colons".to_string(),
            "not-a-uuid:table:users".to_string(),
            format!("{{{PID}}}:table:users"),
            format!("{PID}:queue:users"),
            format!("{PID}:Table:users"),
            format!("{PID}:table:{long}"),
            format!("{PID}:table:users/../admins"),
        ] {
            let err = parse_channel(&channel).unwrap_err();
            assert_eq!(err.code(), "INVALID_CHANNEL_FORMAT", "channel {channel}");
        }
    }

    #[test]
    fn caller_identity_is_required() {
        let channel = format!("{PID}:table:users");
        assert_eq!(
            assert_subscription(&channel, None).unwrap_err(),
            GateError::MissingProjectId
        );
    }

    #[test]
    fn uppercase_project_ids_match_by_value() {
        let lower = "aaaaaaaa-bbbb-4ccc-8ddd-eeeeeeeeeeee";
        let caller = ProjectId::parse(lower).unwrap();
        let channel = format!("{}:table:users", lower.to_uppercase());
        assert!(assert_subscription(&channel, Some(&caller)).is_ok());
    }
}
