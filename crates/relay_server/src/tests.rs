// End-to-end scenarios across the node, router, dispatcher and heartbeat.
#[cfg(test)]
mod tests {
    use crate::cluster::{group_key, MemoryCluster};
    use crate::testing::MockSocket;
    use crate::*;
    use futures::{SinkExt, StreamExt};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_tungstenite::{connect_async, tungstenite::Message};

    /// Polls `check` until it holds or five seconds pass.
    async fn wait_for(mut check: impl FnMut() -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while tokio::time::Instant::now() < deadline {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    async fn wait_for_online(node: &RelayNode, expected: usize) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while tokio::time::Instant::now() < deadline {
            if node.online_count().await == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    fn node_config(port: u16) -> RelayConfig {
        RelayConfig {
            advertise: NodeAddr::new("127.0.0.1", port),
            heartbeat: HeartbeatConfig {
                interval_secs: 1,
                probe_timeout_secs: 1,
            },
            delivery: DeliveryConfig {
                write_timeout_secs: 1,
                ..DeliveryConfig::default()
            },
            ..RelayConfig::default()
        }
    }

    async fn single_node() -> (RelayNode, ShutdownState) {
        let node = RelayNode::new(node_config(7801), None).unwrap();
        let shutdown = ShutdownState::new();
        node.start(shutdown.clone()).await.unwrap();
        (node, shutdown)
    }

    async fn clustered_node(cluster: &MemoryCluster, port: u16, limit: usize) -> Arc<RelayNode> {
        let mut config = node_config(port);
        let settings = ClusterConfig {
            group_client_limit: limit,
            ..ClusterConfig::default()
        };
        config.cluster = Some(settings.clone());
        let node = Arc::new(RelayNode::new(config, Some(cluster.backend(settings))).unwrap());
        node.attach_to_mesh(&cluster.mesh);
        node.start(ShutdownState::new()).await.unwrap();
        node
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_single_node_delivery_and_heartbeat_eviction() {
        let (node, shutdown) = single_node().await;
        let socket = MockSocket::new();
        let x = node.connect("shop", socket.clone()).await.unwrap();

        assert_eq!(node.route_to_client(&x, "hello").await.unwrap(), Delivery::Local);
        assert!(wait_for(|| socket.frames() == vec!["hello".to_string()]).await);

        socket.set_failing(true);
        assert!(wait_for_online(&node, 0).await);
        assert_eq!(socket.close_reason().as_deref(), Some("heartbeat timeout"));

        shutdown.initiate_shutdown();
        node.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_client_that_stops_reading_does_not_stall_the_node() {
        let (node, shutdown) = single_node().await;
        let stuck_socket = MockSocket::new();
        stuck_socket.set_send_stalled(true);
        let healthy_socket = MockSocket::new();
        let stuck = node.connect("shop", stuck_socket.clone()).await.unwrap();
        let healthy = node.connect("shop", healthy_socket.clone()).await.unwrap();

        node.route_to_client(&stuck, "large").await.unwrap();
        node.route_to_client(&healthy, "hello").await.unwrap();

        assert!(wait_for(|| healthy_socket.frames() == vec!["hello".to_string()]).await);
        assert!(stuck_socket.frames().is_empty());

        shutdown.initiate_shutdown();
        node.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sends_to_one_client_arrive_in_order() {
        let (node, shutdown) = single_node().await;
        let socket = MockSocket::new();
        let x = node.connect("shop", socket.clone()).await.unwrap();

        node.route_to_client(&x, "A").await.unwrap();
        node.route_to_client(&x, "B").await.unwrap();
        assert!(wait_for(|| socket.frames().len() == 2).await);
        assert_eq!(socket.frames(), vec!["A".to_string(), "B".to_string()]);

        shutdown.initiate_shutdown();
        node.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_single_node_group_send_survives_failed_member() {
        let (node, shutdown) = single_node().await;
        let x_socket = MockSocket::new();
        let y_socket = MockSocket::new();
        let x = node.connect("shop", x_socket.clone()).await.unwrap();
        let y = node.connect("shop", y_socket.clone()).await.unwrap();
        let group = group_key("shop", "g");
        node.join_group(&group, &x).await.unwrap();
        node.join_group(&group, &y).await.unwrap();

        let outcome = node.route_to_group(&group, "hi").await.unwrap();
        assert_eq!(outcome, GroupDelivery::Local { attempted: 2, failed: 0 });
        assert!(wait_for(|| {
            x_socket.frames() == vec!["hi".to_string()] && y_socket.frames() == vec!["hi".to_string()]
        })
        .await);

        x_socket.set_failing(true);
        node.route_to_group(&group, "again").await.unwrap();
        assert!(wait_for(|| y_socket.frames().len() == 2).await);
        assert_eq!(y_socket.frames()[1], "again");
        assert_eq!(x_socket.frames().len(), 1);

        shutdown.initiate_shutdown();
        node.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_closed_client_leaves_no_group_trace() {
        let cluster = MemoryCluster::new();
        let node = clustered_node(&cluster, 7801, 10).await;
        let x = node.connect("shop", MockSocket::new()).await.unwrap();
        let group = group_key("shop", "g");
        node.join_group(&group, &x).await.unwrap();
        assert_eq!(node.members_of(&group).await.unwrap(), vec![x.clone()]);

        node.close_client(&x).await.unwrap();
        assert!(node.members_of(&group).await.unwrap().is_empty());
        assert!(matches!(
            node.join_group(&group, &x).await,
            Err(RelayError::ClientNotAlive(_))
        ));
        node.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_group_limit_across_nodes() {
        let cluster = MemoryCluster::new();
        let a = clustered_node(&cluster, 7801, 3).await;
        let b = clustered_node(&cluster, 7802, 3).await;
        let group = group_key("shop", "vip");

        let mut ids = Vec::new();
        for i in 0..4 {
            let node = if i % 2 == 0 { &a } else { &b };
            ids.push(node.connect("shop", MockSocket::new()).await.unwrap());
        }

        for id in &ids[..3] {
            a.join_group(&group, id).await.unwrap();
        }
        let err = a.join_group(&group, &ids[3]).await.unwrap_err();
        assert!(matches!(err, RelayError::GroupCapacityExceeded { limit: 3, .. }));
        assert_eq!(b.members_of(&group).await.unwrap().len(), 3);

        a.stop().await;
        b.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_two_node_cluster_routing() {
        let cluster = MemoryCluster::new();
        let a = clustered_node(&cluster, 7801, 100).await;
        let b = clustered_node(&cluster, 7802, 100).await;

        let x_socket = MockSocket::new();
        let y_socket = MockSocket::new();
        let x = b.connect("shop", x_socket.clone()).await.unwrap();
        let y = a.connect("shop", y_socket.clone()).await.unwrap();

        // direct send from the node that does not own the client
        let delivery = a.route_to_client(&x, "direct").await.unwrap();
        assert_eq!(delivery, Delivery::Forwarded(NodeAddr::new("127.0.0.1", 7802)));
        assert!(wait_for(|| x_socket.frames() == vec!["direct".to_string()]).await);

        // join forwarded to the owner, visible cluster-wide
        let group = group_key("shop", "g");
        a.join_group(&group, &x).await.unwrap();
        a.join_group(&group, &y).await.unwrap();
        let mut members = b.members_of(&group).await.unwrap();
        members.sort();
        let mut expected = vec![x.clone(), y.clone()];
        expected.sort();
        assert_eq!(members, expected);

        // one publish reaches members on both nodes exactly once
        assert_eq!(a.route_to_group(&group, "all").await.unwrap(), GroupDelivery::Published);
        assert!(wait_for(|| {
            x_socket.frames().len() == 2 && y_socket.frames().len() == 1
        })
        .await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(x_socket.frames(), vec!["direct".to_string(), "all".to_string()]);
        assert_eq!(y_socket.frames(), vec!["all".to_string()]);

        // close forwarded to the owner cleans up everywhere
        a.close_client(&x).await.unwrap();
        assert_eq!(b.online_count().await, 0);
        assert_eq!(a.members_of(&group).await.unwrap(), vec![y.clone()]);

        a.stop().await;
        b.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_foreign_token_is_an_invalid_target() {
        let cluster = MemoryCluster::new();
        let node = clustered_node(&cluster, 7801, 10).await;
        let stranger = RelayNode::new(
            RelayConfig {
                crypto_key: "another-key".to_string(),
                ..node_config(7801)
            },
            None,
        )
        .unwrap();
        let foreign = stranger.connect("shop", MockSocket::new()).await.unwrap();

        assert!(matches!(
            node.route_to_client(&foreign, "hi").await,
            Err(RelayError::InvalidTarget(_))
        ));
        assert!(matches!(
            node.join_group("shop:g", &foreign).await,
            Err(RelayError::MalformedIdentifier(_))
        ));
        node.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_websocket_connect_ack_and_delivery() {
        let config = RelayConfig {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            ..RelayConfig::default()
        };
        let server = Arc::new(RelayServer::new(config, None).unwrap());
        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = ShutdownState::new();
        let serving = {
            let server = server.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { server.serve(listener, shutdown).await })
        };

        let (mut ws, _) = connect_async(format!("ws://{addr}/?systemId=shop")).await.unwrap();
        let ack = ws.next().await.unwrap().unwrap();
        let ack: serde_json::Value = serde_json::from_str(ack.to_text().unwrap()).unwrap();
        assert_eq!(ack["code"], 0);
        assert_eq!(ack["msg"], "success");
        let client_id = ClientId::from(ack["data"]["clientId"].as_str().unwrap());

        server.node().route_to_client(&client_id, "hello").await.unwrap();
        let frame = ws.next().await.unwrap().unwrap();
        assert_eq!(frame.to_text().unwrap(), "hello");

        ws.send(Message::Close(None)).await.unwrap();
        let node = server.node().clone();
        assert!(wait_for_online(&node, 0).await);

        shutdown.initiate_shutdown();
        serving.await.unwrap().unwrap();
        assert!(shutdown.is_shutdown_complete());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_websocket_without_system_id_is_refused() {
        let config = RelayConfig {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            ..RelayConfig::default()
        };
        let server = Arc::new(RelayServer::new(config, None).unwrap());
        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();
        let serving = {
            let server = server.clone();
            tokio::spawn(async move { server.serve(listener, ShutdownState::new()).await })
        };

        let (mut ws, _) = connect_async(format!("ws://{addr}/")).await.unwrap();
        let reply = ws.next().await.unwrap().unwrap();
        let reply: serde_json::Value = serde_json::from_str(reply.to_text().unwrap()).unwrap();
        assert_eq!(reply["code"], 10001);
        assert_eq!(server.node().online_count().await, 0);

        server.shutdown();
        serving.await.unwrap().unwrap();
    }
}
