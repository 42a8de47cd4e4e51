//! dolmetsch-cli – Bibliotheks-Root
//!
//! Spielt ein komplettes Gespraech zwischen zwei Geraeten im selben Prozess
//! durch: QR-Pairing ueber In-Memory-Signaling, verschluesselte Audio-Frames
//! in beide Richtungen und Transkript-Abgleich.

use anyhow::{bail, ensure, Context, Result};
use dolmetsch_core::{DolmetschConfig, Speaker};
use dolmetsch_crypto::{DeviceIdentity, E2eConfig, FrameCipher, SecurityCode, SessionKeyStore};
use dolmetsch_pairing::{
    parse_qr_data, InMemorySignaling, PairingEvent, PairingGuest, PairingHost, SignalingChannel,
};
use dolmetsch_stream::{TranscriptReconciler, TranscriptSegment};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Anzahl Audio-Frames pro Richtung
pub const DEMO_FRAMES: usize = 50;
/// 20 ms Audio bei 8 kHz
const FRAME_GROESSE: usize = 160;

/// Ergebnis eines Demo-Durchlaufs
#[derive(Debug)]
pub struct DemoBericht {
    pub security_code: SecurityCode,
    /// Erfolgreich entschluesselte Frames (beide Richtungen)
    pub frames: usize,
    /// Wiederholter Frame wurde abgewiesen
    pub replay_abgewiesen: bool,
    pub transkript: Vec<TranscriptSegment>,
}

/// Fuehrt die Loopback-Demo mit der gegebenen Konfiguration aus
pub async fn loopback_demo(config: &DolmetschConfig) -> Result<DemoBericht> {
    let e2e = E2eConfig::aus_einstellungen(&config.krypto);
    let signaling: Arc<dyn SignalingChannel> = Arc::new(InMemorySignaling::neu());

    let host_store = Arc::new(SessionKeyStore::from_config(&e2e));
    let gast_store = Arc::new(SessionKeyStore::from_config(&e2e));
    let host = PairingHost::new(
        Arc::new(DeviceIdentity::generate()),
        Arc::clone(&signaling),
        Arc::clone(&host_store),
        config.pairing.ttl(),
    );
    let gast = PairingGuest::new(
        Arc::new(DeviceIdentity::generate()),
        signaling,
        Arc::clone(&gast_store),
    );

    // 1. Pairing
    let mut events = host.subscribe();
    let sprache = &config.sprache;
    let session = host
        .create_session(sprache.quelle.clone(), sprache.ziel.clone())
        .await?;
    tracing::info!(session = %session.session_id(), "QR-Code erzeugt");

    let qr = parse_qr_data(&host.generate_qr_data()?).context("QR-Code nicht lesbar")?;
    let beigetreten = gast
        .join_session(
            &qr,
            sprache.ziel.clone(),
            sprache.quelle.clone(),
            &CancellationToken::new(),
        )
        .await?;

    let host_code = loop {
        match events.recv().await? {
            PairingEvent::PeerFound { peer_id, .. } => {
                tracing::debug!(peer = %peer_id, "Gast gefunden");
            }
            PairingEvent::PeerJoined { security_code, .. } => break security_code,
            anderes => bail!("Unerwartetes Pairing-Event: {anderes:?}"),
        }
    };
    ensure!(
        host_code == beigetreten.security_code,
        "Sicherheitscodes stimmen nicht ueberein"
    );
    tracing::info!(code = host_code.as_str(), "Geraete gekoppelt");

    // 2. Verschluesselte Frames
    // Eigene Richtungsschluessel: die ssrcs duerfen kollidieren
    let host_cipher = FrameCipher::new(host_store, e2e, rand::random());
    let gast_cipher = FrameCipher::new(gast_store, e2e, rand::random());
    let gast_peer = gast.peer_id();
    let host_peer = beigetreten.host_peer;

    let mut frames = 0;
    let mut letzter = Vec::new();
    for i in 0..DEMO_FRAMES {
        let audio = vec![i as u8; FRAME_GROESSE];

        let hin = gast_cipher.encrypt_frame_bytes(&host_peer, &audio)?;
        ensure!(host_cipher.decrypt_frame_bytes(&gast_peer, &hin)? == audio);

        let zurueck = host_cipher.encrypt_frame_bytes(&gast_peer, &audio)?;
        ensure!(gast_cipher.decrypt_frame_bytes(&host_peer, &zurueck)? == audio);

        frames += 2;
        letzter = hin;
    }
    let replay_abgewiesen = host_cipher.decrypt_frame_bytes(&gast_peer, &letzter).is_err();
    tracing::info!(frames, replay_abgewiesen, "Frames ausgetauscht");

    // 3. Transkript
    let mut abgleich = TranscriptReconciler::new();
    let remote = Speaker::Remote(host_peer);
    for segment in [
        TranscriptSegment::partial(Speaker::Local, "guten", 1),
        TranscriptSegment::partial(remote, "buenos", 1),
        TranscriptSegment::partial(Speaker::Local, "guten Tag", 2),
        TranscriptSegment::final_segment(Speaker::Local, "guten Tag", Some("buenos dias".into()), 3),
        TranscriptSegment::final_segment(remote, "buenos dias", Some("guten Tag".into()), 4),
        // Doppelt zugestellt
        TranscriptSegment::final_segment(remote, "buenos dias", Some("guten Tag".into()), 4),
    ] {
        abgleich.apply(segment);
    }

    host.cancel_session().await;

    Ok(DemoBericht {
        security_code: host_code,
        frames,
        replay_abgewiesen,
        transkript: abgleich.log().to_vec(),
    })
}
