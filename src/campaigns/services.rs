use std::collections::HashMap;

use tracing::warn;

use super::dto::{Campaign, Location, Organizer};
use crate::schools::{dto::School, repo as schools};
use crate::store::{Document, DocumentStore};

pub const ANONYMOUS_ORGANIZER: &str = "Anonymous";

/// Overlay location and organizer details taken from the owning school.
pub fn apply_school(campaign: &mut Campaign, school: &School) {
    campaign.location = Some(Location {
        city: school.city.clone(),
        country: school.country.clone(),
    });
    let name = match school.contact_name.trim() {
        "" => ANONYMOUS_ORGANIZER.to_string(),
        n => n.to_string(),
    };
    let role = campaign.organizer.as_ref().and_then(|o| o.role.clone());
    campaign.organizer = Some(Organizer {
        name,
        profile_image: school.profile_image.clone(),
        role,
    });
}

/// Fill in school details. Lookup failures leave the campaign as stored.
pub async fn populate(store: &dyn DocumentStore, mut doc: Document<Campaign>) -> Document<Campaign> {
    match schools::get(store, &doc.data.school_id).await {
        Ok(Some(school)) => apply_school(&mut doc.data, &school.data),
        Ok(None) => {}
        Err(e) => warn!(campaign_id = %doc.id, error = %e, "school lookup failed"),
    }
    doc
}

/// Populate a page of campaigns, looking each school up once.
pub async fn populate_all(
    store: &dyn DocumentStore,
    docs: Vec<Document<Campaign>>,
) -> Vec<Document<Campaign>> {
    let mut cache: HashMap<String, Option<School>> = HashMap::new();
    let mut out = Vec::with_capacity(docs.len());
    for mut doc in docs {
        let school_id = doc.data.school_id.clone();
        if !cache.contains_key(&school_id) {
            let school = match schools::get(store, &school_id).await {
                Ok(found) => found.map(|d| d.data),
                Err(e) => {
                    warn!(%school_id, error = %e, "school lookup failed");
                    None
                }
            };
            cache.insert(school_id.clone(), school);
        }
        if let Some(Some(school)) = cache.get(&school_id) {
            apply_school(&mut doc.data, school);
        }
        out.push(doc);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn campaign(school_id: &str) -> Campaign {
        Campaign {
            name: "Robotics lab".into(),
            goal: 1000.0,
            status: "active".into(),
            school_id: school_id.into(),
            ..Default::default()
        }
    }

    #[test]
    fn empty_contact_name_becomes_anonymous() {
        let mut c = campaign("s1");
        let school = School {
            city: "Nairobi".into(),
            country: "Kenya".into(),
            contact_name: "  ".into(),
            ..Default::default()
        };
        apply_school(&mut c, &school);
        assert_eq!(c.organizer.unwrap().name, ANONYMOUS_ORGANIZER);
        assert_eq!(
            c.location,
            Some(Location {
                city: "Nairobi".into(),
                country: "Kenya".into()
            })
        );
    }

    #[tokio::test]
    async fn populate_uses_school_details() {
        let store = MemoryStore::new();
        let school = School {
            city: "Lima".into(),
            country: "Peru".into(),
            contact_name: "Ana".into(),
            profile_image: Some("https://img/ana.png".into()),
            ..Default::default()
        };
        schools::upsert(&store, "s1", school).await.unwrap();

        let doc = Document {
            id: "c1".into(),
            data: campaign("s1"),
        };
        let doc = populate(&store, doc).await;
        let organizer = doc.data.organizer.unwrap();
        assert_eq!(organizer.name, "Ana");
        assert_eq!(organizer.profile_image.as_deref(), Some("https://img/ana.png"));
        assert_eq!(doc.data.location.unwrap().city, "Lima");
    }

    #[tokio::test]
    async fn missing_school_leaves_campaign_untouched() {
        let store = MemoryStore::new();
        let docs = vec![Document {
            id: "c1".into(),
            data: campaign("nobody"),
        }];
        let docs = populate_all(&store, docs).await;
        assert!(docs[0].data.organizer.is_none());
        assert!(docs[0].data.location.is_none());
    }
}
