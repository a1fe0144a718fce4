use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::Identifiable;

/// Root entity kinds managed by the service.
///
/// A kind's resource name is both its HTTP path segment and its log topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    DeviceType,
    Protocol,
    Concept,
    Characteristic,
    Function,
    Aspect,
    DeviceClass,
    Device,
    Hub,
    Location,
}

impl EntityKind {
    pub const ALL: [EntityKind; 10] = [
        EntityKind::DeviceType,
        EntityKind::Protocol,
        EntityKind::Concept,
        EntityKind::Characteristic,
        EntityKind::Function,
        EntityKind::Aspect,
        EntityKind::DeviceClass,
        EntityKind::Device,
        EntityKind::Hub,
        EntityKind::Location,
    ];

    /// Plural resource name, e.g. `device-types`.
    pub fn resource(&self) -> &'static str {
        match self {
            EntityKind::DeviceType => "device-types",
            EntityKind::Protocol => "protocols",
            EntityKind::Concept => "concepts",
            EntityKind::Characteristic => "characteristics",
            EntityKind::Function => "functions",
            EntityKind::Aspect => "aspects",
            EntityKind::DeviceClass => "device-classes",
            EntityKind::Device => "devices",
            EntityKind::Hub => "hubs",
            EntityKind::Location => "locations",
        }
    }

    /// Log topic commands for this kind are appended to.
    pub fn topic(&self) -> &'static str {
        self.resource()
    }

    /// Segment used in minted ids, e.g. `device-type`.
    pub fn id_segment(&self) -> &'static str {
        match self {
            EntityKind::DeviceType => "device-type",
            EntityKind::Protocol => "protocol",
            EntityKind::Concept => "concept",
            EntityKind::Characteristic => "characteristic",
            EntityKind::Function => "function",
            EntityKind::Aspect => "aspect",
            EntityKind::DeviceClass => "device-class",
            EntityKind::Device => "device",
            EntityKind::Hub => "hub",
            EntityKind::Location => "location",
        }
    }

    /// Commands for owner-scoped kinds must name the owning user.
    pub fn is_owner_scoped(&self) -> bool {
        matches!(
            self,
            EntityKind::Device | EntityKind::Hub | EntityKind::Location
        )
    }

    pub fn owner_scoped_topics() -> impl Iterator<Item = &'static str> {
        Self::ALL
            .into_iter()
            .filter(EntityKind::is_owner_scoped)
            .map(|kind| kind.topic())
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.resource() == s)
            .ok_or_else(|| format!("unknown resource `{s}`"))
    }
}

/// A root entity type that can be written through the command log.
pub trait Resource:
    Identifiable + Serialize + DeserializeOwned + Clone + Send + Sync + 'static
{
    const KIND: EntityKind;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resources_round_trip() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.resource().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("widgets".parse::<EntityKind>().is_err());
    }

    #[test]
    fn owner_scoped_kinds() {
        let topics: Vec<_> = EntityKind::owner_scoped_topics().collect();
        assert_eq!(topics, vec!["devices", "hubs", "locations"]);
        assert!(!EntityKind::DeviceType.is_owner_scoped());
    }
}
