use otp_client::{MockApi, OtpApi};
use otp_core::TotpAttempt;
use otp_panel::view::render;
use otp_panel::{Command, Dashboard, Flow, Phase, Session, Tab};

fn cmd(line: &str) -> Command {
    line.parse().unwrap()
}

#[tokio::test]
async fn operator_adds_blocks_and_removes_a_device() {
    let api = MockApi::new();
    let dashboard = Dashboard::new(api.clone(), Tab::Devices);
    dashboard.refresh_all().await.unwrap();
    assert!(render(&dashboard.snapshot().await).contains("No hay dispositivos"));

    let mut session = Session::new(dashboard.clone());

    let Flow::Continue(Some(notice)) = session.handle(cmd("add Caja 1")).await else {
        panic!("add should report the new code");
    };
    assert!(notice.starts_with("✅ Dispositivo agregado: Caja 1"));
    let code = notice.rsplit("OTP: ").next().unwrap().to_owned();
    assert_eq!(code.len(), 6);

    let screen = render(&dashboard.snapshot().await);
    assert!(screen.contains("Caja 1"));
    assert!(screen.contains("[Activo]"));
    assert!(screen.contains(&format!("OTP: {code}")));

    // The code shown on the card is the one the service accepts.
    let attempt = TotpAttempt {
        user_id: "ana".into(),
        otp: code.clone(),
        device_name: "Caja 1".into(),
    };
    api.create_user(&otp_core::NewUser {
        user_id: "ana".into(),
        full_name: "Ana".into(),
        email: "ana@example.com".into(),
        cedula: "0102".into(),
    })
    .await
    .unwrap();
    assert!(dashboard.validate_totp(&attempt).await.unwrap().valid);

    session.handle(cmd("toggle Caja 1")).await;
    assert!(render(&dashboard.snapshot().await).contains("[Bloqueado]"));
    assert!(!dashboard.validate_totp(&attempt).await.unwrap().valid);

    session.handle(cmd("delete Caja 1")).await;
    session.handle(cmd("n")).await;
    assert_eq!(dashboard.snapshot().await.devices.items().len(), 1);

    session.handle(cmd("delete Caja 1")).await;
    session.handle(cmd("y")).await;
    let view = dashboard.snapshot().await;
    assert!(view.devices.items().is_empty());
    assert_eq!(view.devices.phase(), &Phase::Ready);

    // Every validation attempt above shows up in the access log.
    session.handle(cmd("tab logs")).await;
    let screen = render(&dashboard.snapshot().await);
    assert!(screen.contains("[Accesos]"));
    assert!(screen.contains("✔ Caja 1 • Acceso exitoso (ana)"));
    assert!(screen.contains("✖ Caja 1 • Dispositivo deshabilitado (ana)"));
}

#[tokio::test]
async fn operator_registers_a_user_and_fetches_the_qr() {
    let dashboard = Dashboard::new(MockApi::with_demo_data(), Tab::Registro);
    let mut session = Session::new(dashboard.clone());

    assert!(matches!(
        session.handle(cmd("submit")).await,
        Flow::Continue(Some(text)) if text.contains("Completa todos los campos")
    ));

    for line in [
        "set user_id luis",
        "set full_name Luis Andrade",
        "set email luis@example.com",
        "set cedula 0911223344",
    ] {
        session.handle(cmd(line)).await;
    }
    assert!(render(&dashboard.snapshot().await).contains("listo para registrar"));

    session.handle(cmd("submit")).await;
    session.handle(cmd("tab users")).await;
    session.handle(cmd("qr luis")).await;

    let screen = render(&dashboard.snapshot().await);
    assert!(screen.contains("▸ luis  Luis Andrade <luis@example.com>"));
    assert!(screen.contains("QR de luis: imagen PNG de"));

    session.handle(cmd("user luis")).await;
    let view = dashboard.snapshot().await;
    let luis = view.users.items().iter().find(|u| u.user_id == "luis").unwrap();
    assert!(!luis.status_user);
}

#[tokio::test]
async fn outage_keeps_last_known_lists_visible() {
    let api = MockApi::with_demo_data();
    let dashboard = Dashboard::new(api.clone(), Tab::Devices);
    dashboard.refresh_all().await.unwrap();

    api.set_offline(true);
    assert!(dashboard.refresh_all().await.is_err());

    let screen = render(&dashboard.snapshot().await);
    assert!(screen.contains("⚠ Error: HTTP 503: service unavailable"));
    assert!(screen.contains("RECEPCION-PC"));
    assert!(screen.contains("BODEGA-01"));
}
