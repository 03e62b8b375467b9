use crate::models::{Feature, Resolution, Role, ViewDescriptor, ViewVariant};

const LEADS_RESTRICTED_FEATURES: &[Feature] = &[Feature::Coaching, Feature::Inbox];

/// Picks the view for `feature` given the session's role.
///
/// `None` means the session is still loading. Unrecognized roles get the
/// client view.
pub fn resolve_view(role: Option<&Role>, feature: Feature) -> Resolution {
    let Some(role) = role else {
        return Resolution::Loading;
    };

    if *role == Role::Leads && LEADS_RESTRICTED_FEATURES.contains(&feature) {
        return Resolution::Restricted {
            reason: format!(
                "The {} section is available once you start a coaching plan.",
                feature.as_str()
            ),
        };
    }

    Resolution::View(ViewDescriptor {
        feature,
        variant: variant_for(role),
    })
}

pub fn variant_for(role: &Role) -> ViewVariant {
    match role {
        Role::Trainer | Role::Nutritionist => ViewVariant::Coach,
        Role::Admin => ViewVariant::Admin,
        Role::Hr => ViewVariant::Hr,
        _ => ViewVariant::Client,
    }
}

/// Resolves directly from the raw session tag.
pub fn resolve_view_for_tag(tag: Option<&str>, feature: Feature) -> Resolution {
    resolve_view(Role::from_session_tag(tag).as_ref(), feature)
}
