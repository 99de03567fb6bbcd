pub mod actor;
pub mod character;
pub mod episode;
pub mod ids;
pub mod organization;

pub use actor::Actor;
pub use character::Character;
pub use episode::{clean_writer_credit, Episode, EpisodeDetails, EpisodeKey, Series};
pub use ids::{ActorId, CharacterId, EpisodeId, OrganizationId, SeriesId, ShipId, SpeciesId};
pub use organization::{Organization, Ship, Species};
