//! Trail map renderer.
//!
//! The drawing surface is imperative and has no diffing of its own, so the
//! renderer keeps the set of overlays it has drawn and, on every render,
//! plans the desired set and issues only the add/remove calls needed to
//! get there.  Rendering the same trails twice leaves the surface as it was
//! after the first render.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use moodwalk_common::geo::{parse_route, Bounds, LatLng};
use moodwalk_common::protocol::{Location, Trail};

pub type OverlayId = u64;

/// Seoul City Hall; initial center when the device position is unknown.
pub const DEFAULT_CENTER: LatLng = LatLng { lat: 37.5665, lng: 126.9780 };
pub const INITIAL_LEVEL: u8 = 5;
/// Zoom level used when a single point-only trail is shown.
pub const POINT_LEVEL: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    Start,
    End,
    Plain,
    CurrentLocation,
}

impl MarkerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerKind::Start => "start",
            MarkerKind::End => "end",
            MarkerKind::Plain => "trail",
            MarkerKind::CurrentLocation => "current_location",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeStyle {
    pub weight: u32,
    pub color: &'static str,
    pub opacity: f64,
}

impl StrokeStyle {
    /// Wide dark line drawn under the route.
    pub const BACKGROUND: StrokeStyle = StrokeStyle { weight: 8, color: "#333333", opacity: 0.6 };
    pub const FOREGROUND: StrokeStyle = StrokeStyle { weight: 6, color: "#FF4444", opacity: 0.9 };
}

/// Content of the popup opened by clicking a trail marker.
#[derive(Debug, Clone, PartialEq)]
pub struct InfoPopup {
    pub name: String,
    pub address: String,
    /// Valid route points; `None` for point-only trails.
    pub route_points: Option<usize>,
    pub score: Option<f64>,
}

impl InfoPopup {
    /// Plain-text rendering, one line per field.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![self.name.clone(), self.address.clone()];
        match self.route_points {
            Some(n) => lines.push(format!("루트 길이: {n}개 지점")),
            None => lines.push("위치만 표시 (루트 정보 없음)".to_string()),
        }
        if let Some(score) = self.score {
            lines.push(format!("추천 점수: {score}"));
        }
        lines
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Overlay {
    Polyline { style: StrokeStyle, path: Vec<LatLng> },
    Marker { kind: MarkerKind, position: LatLng, title: String, popup: Option<InfoPopup> },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Viewport {
    Fit(Bounds),
    Center { center: LatLng, level: u8 },
}

/// Imperative drawing surface (a map SDK instance or a recorder).
pub trait MapSurface {
    fn add(&mut self, overlay: &Overlay) -> OverlayId;
    fn remove(&mut self, id: OverlayId);
    fn open_popup(&mut self, marker: OverlayId, popup: &InfoPopup);
    fn close_popup(&mut self, marker: OverlayId);
    fn fit_bounds(&mut self, bounds: &Bounds);
    fn set_center(&mut self, center: LatLng, level: u8);
}

/// Desired overlays and viewport for one render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub overlays: Vec<Overlay>,
    pub viewport: Option<Viewport>,
    pub bounds: Bounds,
}

/// Compute the overlays for `trails`, in array order.
pub fn plan(trails: &[Trail], current_location: Option<Location>) -> Plan {
    let mut out = Plan::default();

    for trail in trails {
        if trail.route_len() >= 2 {
            plan_route(trail, &mut out);
        } else if let Some(point) = trail.coordinates {
            match LatLng::new(point.latitude, point.longitude) {
                Some(position) => {
                    out.bounds.extend(position);
                    out.overlays.push(Overlay::Marker {
                        kind: MarkerKind::Plain,
                        position,
                        title: trail.name.clone(),
                        popup: Some(popup_for(trail, None)),
                    });
                }
                None => warn!("{}: coordinates out of range", trail.name),
            }
        } else {
            warn!("{}: no coordinates, nothing drawn", trail.name);
        }
    }

    if let Some(here) = current_location.and_then(|l| LatLng::new(l.latitude, l.longitude)) {
        out.bounds.extend(here);
        out.overlays.push(Overlay::Marker {
            kind: MarkerKind::CurrentLocation,
            position: here,
            title: "내 위치".to_string(),
            popup: None,
        });
    }

    out.viewport = viewport_for(trails, &out.bounds);
    out
}

fn plan_route(trail: &Trail, out: &mut Plan) {
    let raw = trail.route.as_ref().map(|r| r.coordinates.as_slice()).unwrap_or_default();
    let parsed = parse_route(raw);
    if parsed.dropped > 0 {
        warn!("{}: skipped {} invalid route point(s)", trail.name, parsed.dropped);
    }
    out.bounds.union(&parsed.bounds());

    if parsed.is_drawable() {
        for style in [StrokeStyle::BACKGROUND, StrokeStyle::FOREGROUND] {
            out.overlays.push(Overlay::Polyline { style, path: parsed.points.clone() });
        }
        debug!("{}: route with {} points", trail.name, parsed.points.len());
    } else {
        warn!("{}: not enough valid points ({})", trail.name, parsed.points.len());
    }

    let (Some(first), Some(last)) = (parsed.points.first(), parsed.points.last()) else {
        return;
    };
    out.overlays.push(Overlay::Marker {
        kind: MarkerKind::Start,
        position: *first,
        title: format!("{} 시작점", trail.name),
        popup: Some(popup_for(trail, Some(parsed.points.len()))),
    });
    if parsed.points.len() > 1 {
        out.overlays.push(Overlay::Marker {
            kind: MarkerKind::End,
            position: *last,
            title: format!("{} 끝점", trail.name),
            popup: None,
        });
    }
}

fn popup_for(trail: &Trail, route_points: Option<usize>) -> InfoPopup {
    InfoPopup {
        name: trail.name.clone(),
        address: trail.address.clone(),
        route_points,
        score: trail.score,
    }
}

fn viewport_for(trails: &[Trail], bounds: &Bounds) -> Option<Viewport> {
    let fit = (!bounds.is_empty()).then_some(Viewport::Fit(*bounds));
    match trails {
        [only] if only.route_len() >= 2 => fit,
        [only] => only
            .coordinates
            .and_then(|c| LatLng::new(c.latitude, c.longitude))
            .map(|center| Viewport::Center { center, level: POINT_LEVEL }),
        [] => None,
        _ => fit,
    }
}

// ── Renderer ────────────────────────────────────────────────────────────────

pub struct TrailMapRenderer<S: MapSurface> {
    surface: S,
    drawn: Vec<(OverlayId, Overlay)>,
    open_popup: Option<OverlayId>,
    visible: bool,
}

impl<S: MapSurface> TrailMapRenderer<S> {
    pub fn new(surface: S) -> Self {
        TrailMapRenderer { surface, drawn: Vec::new(), open_popup: None, visible: false }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Overlays currently on the surface, in drawing order.
    pub fn drawn(&self) -> impl Iterator<Item = (OverlayId, &Overlay)> {
        self.drawn.iter().map(|(id, o)| (*id, o))
    }

    /// Bring the surface in line with `trails`.  Hiding the map detaches
    /// everything, same as [`TrailMapRenderer::close`].
    pub fn render(&mut self, trails: &[Trail], visible: bool, current_location: Option<Location>) {
        if !visible {
            self.close();
            return;
        }
        if !self.visible {
            let center = current_location
                .and_then(|l| LatLng::new(l.latitude, l.longitude))
                .unwrap_or(DEFAULT_CENTER);
            self.surface.set_center(center, INITIAL_LEVEL);
            self.visible = true;
        }

        let plan = plan(trails, current_location);
        self.apply(plan.overlays);

        match plan.viewport {
            Some(Viewport::Fit(bounds)) => self.surface.fit_bounds(&bounds),
            Some(Viewport::Center { center, level }) => self.surface.set_center(center, level),
            None => {}
        }
        info!("Map rendered: {} trail(s), {} overlay(s)", trails.len(), self.drawn.len());
    }

    /// Open the popup of a clicked marker, closing any other one first.
    /// Returns false when the marker has no popup.
    pub fn click(&mut self, marker: OverlayId) -> bool {
        let popup = self.drawn.iter().find_map(|(id, o)| match o {
            Overlay::Marker { popup: Some(p), .. } if *id == marker => Some(p.clone()),
            _ => None,
        });
        let Some(popup) = popup else {
            return false;
        };
        if let Some(open) = self.open_popup.take() {
            self.surface.close_popup(open);
        }
        self.surface.open_popup(marker, &popup);
        self.open_popup = Some(marker);
        true
    }

    pub fn open_popup(&self) -> Option<OverlayId> {
        self.open_popup
    }

    /// Detach every marker and polyline.
    pub fn close(&mut self) {
        if let Some(open) = self.open_popup.take() {
            self.surface.close_popup(open);
        }
        for (id, _) in self.drawn.drain(..) {
            self.surface.remove(id);
        }
        self.visible = false;
    }

    /// Multiset diff of drawn vs. desired overlays.
    fn apply(&mut self, desired: Vec<Overlay>) {
        let mut wanted: Vec<Option<Overlay>> = desired.into_iter().map(Some).collect();
        let mut kept = Vec::with_capacity(self.drawn.len());

        for (id, overlay) in self.drawn.drain(..) {
            match wanted.iter_mut().find(|w| w.as_ref() == Some(&overlay)) {
                Some(slot) => {
                    *slot = None;
                    kept.push((id, overlay));
                }
                None => {
                    if self.open_popup == Some(id) {
                        self.surface.close_popup(id);
                        self.open_popup = None;
                    }
                    self.surface.remove(id);
                }
            }
        }

        // New overlays go on in planned order, so a background stroke is
        // always added before its foreground stroke.
        for overlay in wanted.into_iter().flatten() {
            let id = self.surface.add(&overlay);
            kept.push((id, overlay));
        }
        self.drawn = kept;
    }
}

impl<S: MapSurface> Drop for TrailMapRenderer<S> {
    fn drop(&mut self) {
        self.close();
    }
}

// ── GeoJSON surface ─────────────────────────────────────────────────────────

/// Surface that keeps overlays in memory and exports them as GeoJSON.
#[derive(Debug, Default)]
pub struct GeoJsonSurface {
    overlays: BTreeMap<OverlayId, Overlay>,
    next_id: OverlayId,
    viewport: Option<Viewport>,
    open_popup: Option<OverlayId>,
}

impl GeoJsonSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    pub fn popup(&self) -> Option<OverlayId> {
        self.open_popup
    }

    pub fn to_geojson(&self) -> Value {
        let features: Vec<Value> = self.overlays.values().map(feature).collect();
        let mut collection = json!({ "type": "FeatureCollection", "features": features });
        if let Some(Viewport::Fit(bounds)) = self.viewport {
            if let Some((sw, ne)) = bounds.corners() {
                collection["bbox"] = json!([sw.lng, sw.lat, ne.lng, ne.lat]);
            }
        }
        collection
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.to_geojson())?;
        std::fs::write(path, text)
            .with_context(|| format!("Cannot write map to {}", path.display()))
    }
}

fn feature(overlay: &Overlay) -> Value {
    match overlay {
        Overlay::Polyline { style, path } => json!({
            "type": "Feature",
            "geometry": {
                "type": "LineString",
                "coordinates": path.iter().map(|p| [p.lng, p.lat]).collect::<Vec<_>>(),
            },
            "properties": {
                "stroke": style.color,
                "stroke-width": style.weight,
                "stroke-opacity": style.opacity,
            },
        }),
        Overlay::Marker { kind, position, title, popup } => {
            let mut properties = json!({ "kind": kind.as_str(), "title": title });
            if let Some(p) = popup {
                properties["name"] = json!(p.name);
                properties["address"] = json!(p.address);
                properties["score"] = json!(p.score);
                if let Some(n) = p.route_points {
                    properties["route_points"] = json!(n);
                }
            }
            json!({
                "type": "Feature",
                "geometry": { "type": "Point", "coordinates": [position.lng, position.lat] },
                "properties": properties,
            })
        }
    }
}

impl MapSurface for GeoJsonSurface {
    fn add(&mut self, overlay: &Overlay) -> OverlayId {
        self.next_id += 1;
        self.overlays.insert(self.next_id, overlay.clone());
        self.next_id
    }

    fn remove(&mut self, id: OverlayId) {
        self.overlays.remove(&id);
    }

    fn open_popup(&mut self, marker: OverlayId, _popup: &InfoPopup) {
        self.open_popup = Some(marker);
    }

    fn close_popup(&mut self, marker: OverlayId) {
        if self.open_popup == Some(marker) {
            self.open_popup = None;
        }
    }

    fn fit_bounds(&mut self, bounds: &Bounds) {
        self.viewport = Some(Viewport::Fit(*bounds));
    }

    fn set_center(&mut self, center: LatLng, level: u8) {
        self.viewport = Some(Viewport::Center { center, level });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moodwalk_common::protocol::Route;
    use serde_json::json;

    /// Surface that counts calls on top of a GeoJSON recorder.
    #[derive(Default)]
    struct Counting {
        inner: GeoJsonSurface,
        adds: usize,
        removes: usize,
        opened: Vec<OverlayId>,
        closed: Vec<OverlayId>,
    }

    impl MapSurface for Counting {
        fn add(&mut self, overlay: &Overlay) -> OverlayId {
            self.adds += 1;
            self.inner.add(overlay)
        }
        fn remove(&mut self, id: OverlayId) {
            self.removes += 1;
            self.inner.remove(id)
        }
        fn open_popup(&mut self, marker: OverlayId, popup: &InfoPopup) {
            self.opened.push(marker);
            self.inner.open_popup(marker, popup)
        }
        fn close_popup(&mut self, marker: OverlayId) {
            self.closed.push(marker);
            self.inner.close_popup(marker)
        }
        fn fit_bounds(&mut self, bounds: &Bounds) {
            self.inner.fit_bounds(bounds)
        }
        fn set_center(&mut self, center: LatLng, level: u8) {
            self.inner.set_center(center, level)
        }
    }

    fn route_trail(name: &str, coords: Value) -> Trail {
        let coordinates = coords.as_array().cloned().unwrap_or_default();
        Trail {
            name: name.into(),
            address: "서울 성북구".into(),
            score: Some(8.5),
            coordinates: None,
            route: Some(Route { kind: Some("LineString".into()), coordinates }),
        }
    }

    fn point_trail(name: &str, latitude: f64, longitude: f64) -> Trail {
        Trail {
            name: name.into(),
            coordinates: Some(Location { latitude, longitude }),
            ..Default::default()
        }
    }

    fn count(p: &Plan, f: impl Fn(&Overlay) -> bool) -> usize {
        p.overlays.iter().filter(|o| f(o)).count()
    }

    fn is_marker(kind: MarkerKind) -> impl Fn(&Overlay) -> bool {
        move |o| matches!(o, Overlay::Marker { kind: k, .. } if *k == kind)
    }

    fn is_polyline(o: &Overlay) -> bool {
        matches!(o, Overlay::Polyline { .. })
    }

    #[test]
    fn test_two_point_route() {
        let trail = route_trail("장이소공원", json!([[127.0, 37.5], [127.01, 37.51]]));
        let p = plan(&[trail], None);

        assert_eq!(count(&p, is_marker(MarkerKind::Start)), 1);
        assert_eq!(count(&p, is_marker(MarkerKind::End)), 1);
        assert_eq!(count(&p, is_polyline), 2);
        assert!(matches!(
            &p.overlays[0],
            Overlay::Polyline { style, .. } if *style == StrokeStyle::BACKGROUND
        ));
        assert!(matches!(
            &p.overlays[1],
            Overlay::Polyline { style, .. } if *style == StrokeStyle::FOREGROUND
        ));

        let Some(Viewport::Fit(bounds)) = p.viewport else {
            panic!("expected fit, got {:?}", p.viewport);
        };
        assert!(bounds.contains(LatLng { lat: 37.5, lng: 127.0 }));
        assert!(bounds.contains(LatLng { lat: 37.51, lng: 127.01 }));
    }

    #[test]
    fn test_invalid_points_excluded() {
        let trail = route_trail(
            "a",
            json!([[127.0, 37.5], [200.0, 37.5], ["x", 1], [127.0, 95.0], [127.02, 37.52]]),
        );
        let p = plan(&[trail], None);
        let Overlay::Polyline { path, .. } = &p.overlays[0] else {
            panic!("expected polyline first");
        };
        assert_eq!(path.len(), 2);
        assert!(!p.bounds.contains(LatLng { lat: 37.5, lng: 180.0 }));
    }

    #[test]
    fn test_single_valid_point_draws_no_polyline() {
        let trail = route_trail("a", json!([[127.0, 37.5], [500.0, 37.5]]));
        let p = plan(&[trail], None);
        assert_eq!(count(&p, is_polyline), 0);
        assert_eq!(count(&p, is_marker(MarkerKind::Start)), 1);
        assert_eq!(count(&p, is_marker(MarkerKind::End)), 0);
    }

    #[test]
    fn test_trail_without_geometry_is_skipped() {
        let bare = Trail { name: "빈 산책로".into(), ..Default::default() };
        let after = point_trail("b", 37.6, 127.1);
        let p = plan(&[bare, after], None);
        assert_eq!(p.overlays.len(), 1);
        assert_eq!(count(&p, is_marker(MarkerKind::Plain)), 1);
    }

    #[test]
    fn test_single_point_centers_close() {
        let p = plan(&[point_trail("b", 37.6, 127.1)], None);
        assert_eq!(
            p.viewport,
            Some(Viewport::Center { center: LatLng { lat: 37.6, lng: 127.1 }, level: POINT_LEVEL })
        );
        let Overlay::Marker { popup: Some(popup), .. } = &p.overlays[0] else {
            panic!("expected marker with popup");
        };
        assert_eq!(popup.route_points, None);
    }

    #[test]
    fn test_multiple_trails_fit_union_with_current_location() {
        let here = Location { latitude: 37.4, longitude: 126.9 };
        let trails = [
            route_trail("a", json!([[127.0, 37.5], [127.01, 37.51]])),
            point_trail("b", 37.6, 127.1),
        ];
        let p = plan(&trails, Some(here));
        let Some(Viewport::Fit(bounds)) = p.viewport else {
            panic!("expected fit");
        };
        assert!(bounds.contains(LatLng { lat: 37.6, lng: 127.1 }));
        assert!(bounds.contains(LatLng::from(here)));
        assert_eq!(count(&p, is_marker(MarkerKind::CurrentLocation)), 1);
    }

    #[test]
    fn test_render_twice_is_idempotent() {
        let trails = [
            route_trail("a", json!([[127.0, 37.5], [127.01, 37.51]])),
            point_trail("b", 37.6, 127.1),
        ];
        let mut r = TrailMapRenderer::new(Counting::default());
        r.render(&trails, true, None);
        let after_first = r.surface().inner.to_geojson();
        let adds = r.surface().adds;

        r.render(&trails, true, None);
        assert_eq!(r.surface().inner.to_geojson(), after_first);
        assert_eq!(r.surface().adds, adds);
        assert_eq!(r.surface().removes, 0);
        assert_eq!(r.surface().inner.len(), 5);
    }

    #[test]
    fn test_rerender_replaces_stale_overlays() {
        let mut r = TrailMapRenderer::new(Counting::default());
        r.render(&[point_trail("a", 37.5, 127.0)], true, None);
        r.render(&[point_trail("b", 37.6, 127.1)], true, None);
        assert_eq!(r.surface().inner.len(), 1);
        assert_eq!(r.surface().removes, 1);
    }

    #[test]
    fn test_click_closes_other_popup() {
        let trails = [point_trail("a", 37.5, 127.0), point_trail("b", 37.6, 127.1)];
        let mut r = TrailMapRenderer::new(Counting::default());
        r.render(&trails, true, None);
        let ids: Vec<OverlayId> = r.drawn().map(|(id, _)| id).collect();

        assert!(r.click(ids[0]));
        assert!(r.click(ids[1]));
        assert_eq!(r.surface().closed, vec![ids[0]]);
        assert_eq!(r.open_popup(), Some(ids[1]));
    }

    #[test]
    fn test_close_detaches_everything() {
        let trails = [route_trail("a", json!([[127.0, 37.5], [127.01, 37.51]]))];
        let mut r = TrailMapRenderer::new(Counting::default());
        r.render(&trails, true, Some(Location { latitude: 37.4, longitude: 126.9 }));
        assert!(r.surface().inner.len() > 0);

        r.close();
        assert!(r.surface().inner.is_empty());
        assert!(!r.is_visible());

        r.render(&trails, true, None);
        assert_eq!(r.surface().inner.len(), 4);
    }

    #[test]
    fn test_geojson_export() {
        let mut r = TrailMapRenderer::new(GeoJsonSurface::new());
        r.render(&[route_trail("a", json!([[127.0, 37.5], [127.01, 37.51]]))], true, None);
        let doc = r.surface().to_geojson();
        assert_eq!(doc["type"], "FeatureCollection");
        assert_eq!(doc["features"].as_array().map(Vec::len), Some(4));
        assert_eq!(doc["features"][0]["geometry"]["type"], "LineString");
        assert_eq!(doc["bbox"], json!([127.0, 37.5, 127.01, 37.51]));
    }
}
