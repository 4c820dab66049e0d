//! Avatar registry and sprite frames decoded off the frame loop
//!
//! Image payloads arrive as base64 (optionally wrapped in a `data:` URL). Each
//! payload becomes a [`FrameHandle`] immediately; the bytes are decoded on a
//! worker thread and the handle resolves once the RGBA frame is available.
//! Readers never block: a pending or failed handle simply yields no frame.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::RgbaImage;
use log::{debug, warn};
use shared::{AvatarId, AvatarPayload, Facing};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("undecodable image: {0}")]
    Image(#[from] image::ImageError),
    #[error("unreadable file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

/// A decoded RGBA image. Frames are immutable; the id identifies the pixels
/// for texture caching.
#[derive(Debug, Clone)]
pub struct Frame {
    id: u64,
    image: Arc<RgbaImage>,
}

impl Frame {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            id: NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed),
            image: Arc::new(image),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn rgba(&self) -> &[u8] {
        self.image.as_raw()
    }
}

/// Handle to a frame that may still be decoding.
///
/// States: pending (slot empty), ready (`Some(frame)`), failed (`None`).
#[derive(Debug, Clone, Default)]
pub struct FrameHandle {
    slot: Arc<OnceLock<Option<Frame>>>,
}

impl FrameHandle {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn ready(frame: Frame) -> Self {
        let handle = Self::pending();
        handle.resolve(Some(frame));
        handle
    }

    pub fn failed() -> Self {
        let handle = Self::pending();
        handle.resolve(None);
        handle
    }

    /// Decodes an image file on a worker thread.
    pub fn load_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let handle = Self::pending();
        let slot = handle.clone();

        let spawned = thread::Builder::new()
            .name("image-decode".to_string())
            .spawn(move || {
                let result = std::fs::read(&path)
                    .map_err(|source| DecodeError::Io {
                        path: path.clone(),
                        source,
                    })
                    .and_then(|bytes| decode_bytes(&bytes));
                slot.resolve_with(result, &path.display().to_string());
            });

        if let Err(e) = spawned {
            warn!("Failed to spawn image decoder: {}", e);
            handle.resolve(None);
        }
        handle
    }

    /// Returns the frame once decoded.
    pub fn get(&self) -> Option<&Frame> {
        self.slot.get().and_then(Option::as_ref)
    }

    pub fn is_pending(&self) -> bool {
        self.slot.get().is_none()
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.slot.get(), Some(None))
    }

    fn resolve(&self, frame: Option<Frame>) {
        // A slot is written by exactly one decoder.
        let _ = self.slot.set(frame);
    }

    fn resolve_with(&self, result: Result<Frame, DecodeError>, what: &str) {
        match result {
            Ok(frame) => {
                debug!("Decoded {} ({}x{})", what, frame.width(), frame.height());
                self.resolve(Some(frame));
            }
            Err(e) => {
                warn!("Failed to decode {}: {}", what, e);
                self.resolve(None);
            }
        }
    }
}

/// Decodes a batch of base64 payloads on one worker thread, returning a
/// handle per payload in input order.
pub fn decode_payloads(label: &str, payloads: Vec<String>) -> Vec<FrameHandle> {
    let handles: Vec<FrameHandle> = payloads.iter().map(|_| FrameHandle::pending()).collect();
    if payloads.is_empty() {
        return handles;
    }

    let slots = handles.clone();
    let label = label.to_string();
    let spawned = thread::Builder::new()
        .name("image-decode".to_string())
        .spawn(move || {
            for (index, (payload, slot)) in payloads.iter().zip(&slots).enumerate() {
                let what = format!("{} frame {}", label, index);
                slot.resolve_with(decode_payload(payload), &what);
            }
        });

    if let Err(e) = spawned {
        warn!("Failed to spawn image decoder: {}", e);
        for handle in &handles {
            handle.resolve(None);
        }
    }
    handles
}

/// Decodes one base64 image payload, with or without a `data:` URL prefix.
pub fn decode_payload(payload: &str) -> Result<Frame, DecodeError> {
    let data = match payload.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map_or(rest, |(_, data)| data),
        None => payload,
    };
    let bytes = STANDARD.decode(data.trim())?;
    decode_bytes(&bytes)
}

fn decode_bytes(bytes: &[u8]) -> Result<Frame, DecodeError> {
    let image = image::load_from_memory(bytes)?.to_rgba8();
    Ok(Frame::new(image))
}

/// Per-direction frame sequences for one avatar.
#[derive(Debug, Clone)]
pub struct Avatar {
    name: AvatarId,
    frames: HashMap<Facing, Vec<FrameHandle>>,
}

impl Avatar {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            frames: HashMap::new(),
        }
    }

    pub fn with_frames(mut self, facing: Facing, frames: Vec<FrameHandle>) -> Self {
        self.frames.insert(facing, frames);
        self
    }

    /// Starts decoding every frame of the payload.
    pub fn decode(name: &str, payload: &AvatarPayload) -> Self {
        let mut layout = Vec::new();
        let mut payloads = Vec::new();
        for (facing, frames) in payload.frames_by_facing() {
            layout.push((facing, frames.len()));
            payloads.extend(frames.iter().cloned());
        }

        let mut handles = decode_payloads(name, payloads).into_iter();
        let mut avatar = Avatar::new(name);
        for (facing, count) in layout {
            avatar
                .frames
                .insert(facing, handles.by_ref().take(count).collect());
        }
        avatar
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Frame sequence used to draw `facing`. A direction without frames of its
    /// own borrows its mirror source's sequence.
    pub fn sequence(&self, facing: Facing) -> Option<&[FrameHandle]> {
        let own = self.frames.get(&facing).filter(|frames| !frames.is_empty());
        own.or_else(|| {
            facing
                .mirror_source()
                .and_then(|source| self.frames.get(&source))
                .filter(|frames| !frames.is_empty())
        })
        .map(Vec::as_slice)
    }

    /// True once no frame is still decoding.
    pub fn is_settled(&self) -> bool {
        self.frames
            .values()
            .flatten()
            .all(|handle| !handle.is_pending())
    }
}

/// Known avatars by id. Entries are replaced whole; frames themselves never change.
#[derive(Debug, Default)]
pub struct AvatarRegistry {
    avatars: HashMap<AvatarId, Avatar>,
}

impl AvatarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts decoding `payload` and stores it under `id`, replacing any prior entry.
    pub fn register(&mut self, id: &str, payload: &AvatarPayload) {
        debug!("Registering avatar {}", id);
        self.avatars
            .insert(id.to_string(), Avatar::decode(id, payload));
    }

    pub fn insert(&mut self, avatar: Avatar) {
        self.avatars.insert(avatar.name.clone(), avatar);
    }

    /// Drops every known avatar and registers the given set.
    pub fn replace_all(&mut self, payloads: &HashMap<AvatarId, AvatarPayload>) {
        self.avatars.clear();
        for (id, payload) in payloads {
            self.register(id, payload);
        }
    }

    pub fn get(&self, id: &str) -> Option<&Avatar> {
        self.avatars.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.avatars.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.avatars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.avatars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Avatar> {
        self.avatars.values()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgba};
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    /// Base64 of a `width`x`height` PNG filled with `color`.
    pub(crate) fn png_base64(width: u32, height: u32, color: [u8; 4]) -> String {
        let image = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, ImageFormat::Png).unwrap();
        STANDARD.encode(bytes.into_inner())
    }

    pub(crate) fn wait_settled(handle: &FrameHandle) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.is_pending() {
            assert!(Instant::now() < deadline, "frame never finished decoding");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_decode_bare_base64() {
        let frame = decode_payload(&png_base64(3, 2, [255, 0, 0, 255])).unwrap();
        assert_eq!(frame.width(), 3);
        assert_eq!(frame.height(), 2);
        assert_eq!(&frame.rgba()[0..4], &[255, 0, 0, 255]);
    }

    #[test]
    fn test_decode_data_url() {
        let payload = format!("data:image/png;base64,{}", png_base64(1, 1, [0, 0, 255, 255]));
        let frame = decode_payload(&payload).unwrap();
        assert_eq!((frame.width(), frame.height()), (1, 1));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_payload("!!!"), Err(DecodeError::Base64(_))));
        let not_an_image = STANDARD.encode(b"plain text");
        assert!(matches!(decode_payload(&not_an_image), Err(DecodeError::Image(_))));
    }

    #[test]
    fn test_frame_ids_are_unique() {
        let a = Frame::new(RgbaImage::new(1, 1));
        let b = Frame::new(RgbaImage::new(1, 1));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }

    #[test]
    fn test_handle_states() {
        let pending = FrameHandle::pending();
        assert!(pending.is_pending());
        assert!(pending.get().is_none());

        let failed = FrameHandle::failed();
        assert!(failed.is_failed());
        assert!(failed.get().is_none());

        let ready = FrameHandle::ready(Frame::new(RgbaImage::new(2, 2)));
        assert!(!ready.is_pending());
        assert_eq!(ready.get().map(Frame::width), Some(2));
    }

    #[test]
    fn test_batch_decode_resolves_in_order() {
        let handles = decode_payloads(
            "knight",
            vec![
                png_base64(1, 1, [1, 1, 1, 255]),
                "not base64 at all".to_string(),
                png_base64(4, 4, [2, 2, 2, 255]),
            ],
        );
        assert_eq!(handles.len(), 3);
        for handle in &handles {
            wait_settled(handle);
        }

        assert_eq!(handles[0].get().map(Frame::width), Some(1));
        assert!(handles[1].is_failed());
        assert_eq!(handles[2].get().map(Frame::width), Some(4));
    }

    #[test]
    fn test_missing_file_fails() {
        let handle = FrameHandle::load_file("/definitely/not/here.png");
        wait_settled(&handle);
        assert!(handle.is_failed());
    }

    #[test]
    fn test_avatar_decode_groups_frames_by_facing() {
        let mut payload = AvatarPayload {
            name: "knight".to_string(),
            ..Default::default()
        };
        payload.frames.insert(
            "south".to_string(),
            vec![png_base64(2, 2, [9, 9, 9, 255]), png_base64(2, 2, [8, 8, 8, 255])],
        );
        payload
            .frames
            .insert("east".to_string(), vec![png_base64(2, 2, [7, 7, 7, 255])]);

        let avatar = Avatar::decode("knight", &payload);
        assert_eq!(avatar.sequence(Facing::South).map(<[_]>::len), Some(2));
        assert_eq!(avatar.sequence(Facing::East).map(<[_]>::len), Some(1));
        assert!(avatar.sequence(Facing::North).is_none());

        for handle in avatar.sequence(Facing::South).unwrap() {
            wait_settled(handle);
        }
        let first = avatar.sequence(Facing::South).unwrap()[0].get().unwrap();
        assert_eq!(&first.rgba()[0..4], &[9, 9, 9, 255]);
    }

    #[test]
    fn test_west_borrows_east_sequence() {
        let east = vec![FrameHandle::ready(Frame::new(RgbaImage::new(1, 1)))];
        let east_id = east[0].get().unwrap().id();
        let avatar = Avatar::new("knight").with_frames(Facing::East, east);

        let west = avatar.sequence(Facing::West).unwrap();
        assert_eq!(west[0].get().unwrap().id(), east_id);

        let own_west = vec![FrameHandle::ready(Frame::new(RgbaImage::new(1, 1)))];
        let own_id = own_west[0].get().unwrap().id();
        let avatar = avatar.with_frames(Facing::West, own_west);
        assert_eq!(avatar.sequence(Facing::West).unwrap()[0].get().unwrap().id(), own_id);
    }

    #[test]
    fn test_register_overwrites_and_replace_all_clears() {
        let mut registry = AvatarRegistry::new();
        let mut payload = AvatarPayload::default();
        payload
            .frames
            .insert("north".to_string(), vec![png_base64(1, 1, [0, 0, 0, 255])]);

        registry.register("knight", &payload);
        registry.register("knight", &AvatarPayload::default());
        assert_eq!(registry.len(), 1);
        assert!(registry.get("knight").unwrap().sequence(Facing::North).is_none());

        let mut replacement = HashMap::new();
        replacement.insert("mage".to_string(), payload);
        registry.replace_all(&replacement);
        assert!(!registry.contains("knight"));
        assert!(registry.contains("mage"));
    }
}
