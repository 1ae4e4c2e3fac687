//! Immutable site identity (§3 "SiteData", §4.5 "Numeric semantics").

use serde::{Deserialize, Serialize};

/// Trunked site model, bounding the field widths packed into a system
/// identity (§4.5 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteModel {
    Tiny,
    Small,
    Large,
    Huge,
}

impl SiteModel {
    const fn net_id_mask(self) -> u16 {
        match self {
            SiteModel::Tiny => 0x1FF,
            SiteModel::Small => 0x7F,
            SiteModel::Large => 0x1F,
            SiteModel::Huge => 0x03,
        }
    }

    const fn site_id_mask(self) -> u16 {
        match self {
            SiteModel::Tiny => 0x07,
            SiteModel::Small => 0x1F,
            SiteModel::Large => 0xFF,
            SiteModel::Huge => 0x7FF,
        }
    }

    const fn net_id_bits(self) -> u32 {
        match self {
            SiteModel::Tiny => 9,
            SiteModel::Small => 7,
            SiteModel::Large => 5,
            SiteModel::Huge => 2,
        }
    }

    const fn site_id_bits(self) -> u32 {
        match self {
            SiteModel::Tiny => 3,
            SiteModel::Small => 5,
            SiteModel::Large => 7,
            SiteModel::Huge => 10,
        }
    }

    /// 2-bit model tag packed at the MSB of the system identity.
    const fn model_tag(self) -> u32 {
        match self {
            SiteModel::Tiny => 0,
            SiteModel::Small => 1,
            SiteModel::Large => 2,
            SiteModel::Huge => 3,
        }
    }
}

/// Immutable site identity, clamped to per-model field widths at
/// construction (§4.5 table). The only supported mutation is
/// [`SiteData::with_net_active`], which returns a new value rather than
/// mutating in place (§9 design note: model `SiteData` as immutable).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteData {
    site_model: SiteModel,
    net_id: u16,
    site_id: u16,
    par_id: u8,
    require_registration: bool,
    net_active: bool,
}

impl SiteData {
    /// Construct a site identity, clamping `net_id`, `site_id`, and
    /// `par_id` to the ranges permitted by `site_model`.
    ///
    /// A `net_id` or `site_id` of `0` is first bumped to `1` (matching the
    /// original firmware's "zero is never a valid identity" rule) before
    /// the model-specific upper-bound clamp is applied. `par_id` defaults
    /// (or clamps) to `3` when `0` or greater than `3`.
    pub fn new(
        site_model: SiteModel,
        net_id: u16,
        site_id: u16,
        par_id: u8,
        require_registration: bool,
    ) -> Self {
        let net_id = if net_id == 0 { 1 } else { net_id }.min(site_model.net_id_mask());
        let site_id = if site_id == 0 { 1 } else { site_id }.min(site_model.site_id_mask());
        let par_id = if par_id == 0 || par_id > 3 { 3 } else { par_id };

        Self {
            site_model,
            net_id,
            site_id,
            par_id,
            require_registration,
            net_active: false,
        }
    }

    /// Return a copy with `net_active` set, leaving every other field
    /// unchanged (§9 design note).
    pub fn with_net_active(self, net_active: bool) -> Self {
        Self { net_active, ..self }
    }

    pub fn site_model(&self) -> SiteModel {
        self.site_model
    }

    pub fn net_id(&self) -> u16 {
        self.net_id
    }

    pub fn site_id(&self) -> u16 {
        self.site_id
    }

    pub fn par_id(&self) -> u8 {
        self.par_id
    }

    pub fn requires_registration(&self) -> bool {
        self.require_registration
    }

    pub fn net_active(&self) -> bool {
        self.net_active
    }

    /// Pack `{model, netId, siteId, partId}` MSB-first into a 16-bit
    /// system identity. When `msb` is true, `partId` is omitted from the
    /// packed value (§4.5: "partId is omitted when the MSB-only form is
    /// requested").
    pub fn system_identity(&self, msb: bool) -> u16 {
        let mut value: u32 = self.site_model.model_tag();
        value = (value << self.site_model.net_id_bits()) + self.net_id as u32;
        value = (value << self.site_model.site_id_bits()) + self.site_id as u32;
        if !msb {
            value = (value << 2) + self.par_id as u32;
        }
        (value & 0xFFFF) as u16
    }
}

impl Default for SiteData {
    fn default() -> Self {
        SiteData::new(SiteModel::Small, 1, 1, 3, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_net_id_and_site_id_per_model() {
        let site = SiteData::new(SiteModel::Tiny, 0xFFFF, 0xFFFF, 3, false);
        assert_eq!(site.net_id(), 0x1FF);
        assert_eq!(site.site_id(), 0x07);
    }

    #[test]
    fn zero_net_and_site_id_bump_to_one() {
        let site = SiteData::new(SiteModel::Small, 0, 0, 3, false);
        assert_eq!(site.net_id(), 1);
        assert_eq!(site.site_id(), 1);
    }

    #[test]
    fn par_id_defaults_and_clamps_to_three() {
        assert_eq!(SiteData::new(SiteModel::Small, 1, 1, 0, false).par_id(), 3);
        assert_eq!(SiteData::new(SiteModel::Small, 1, 1, 5, false).par_id(), 3);
        assert_eq!(SiteData::new(SiteModel::Small, 1, 1, 2, false).par_id(), 2);
    }

    #[test]
    fn system_identity_is_always_16_bits_and_deterministic() {
        let site = SiteData::new(SiteModel::Large, 0x10, 0x20, 1, false);
        let id = site.system_identity(false);
        // model(2) + netId(5) + siteId(7) + parId(2) == 16 bits exactly.
        assert_eq!(id & !0xFFFFu16, 0);
        assert_eq!(id, site.system_identity(false));
    }

    #[test]
    fn msb_form_omits_partition_id() {
        let site = SiteData::new(SiteModel::Huge, 0x2, 0x100, 2, false);
        let full = site.system_identity(false);
        let msb = site.system_identity(true);
        // The MSB form is the same {model,netId,siteId} value without the
        // extra left-shift-by-2 that makes room for partId in the full form.
        assert_eq!(full >> 2, msb);
    }

    #[test]
    fn with_net_active_does_not_touch_other_fields() {
        let site = SiteData::new(SiteModel::Small, 5, 6, 1, true);
        let active = site.with_net_active(true);
        assert!(active.net_active());
        assert_eq!(active.net_id(), site.net_id());
        assert_eq!(active.site_id(), site.site_id());
        assert!(active.requires_registration());
        assert!(!site.net_active());
    }
}
